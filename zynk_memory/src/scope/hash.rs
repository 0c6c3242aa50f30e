const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hash a name for bucket selection.
///
/// This is 32-bit FNV-1a.
/// The result only picks a bucket;
/// names are always compared byte for byte.
#[inline]
pub fn hash(bytes: &[u8]) -> u32
{
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ byte as u32).wrapping_mul(FNV_PRIME)
    })
}
