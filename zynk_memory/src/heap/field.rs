use super::Block;

/// Largest encoded size of any [`Field`].
pub (crate) const MAX_FIELD_SIZE: usize = 64;

/// Fixed-size value stored at an offset inside an arena block.
///
/// Encodings are little-endian and independent of the host layout,
/// so nothing but bytes ever lives in the pool.
pub (crate) trait Field: Sized
{
    /// Number of bytes [`encode`][`Self::encode`] writes.
    const SIZE: usize;

    /// Write exactly [`SIZE`][`Self::SIZE`] bytes to `out`.
    fn encode(&self, out: &mut [u8]);

    /// Read back what [`encode`][`Self::encode`] wrote.
    fn decode(bytes: &[u8]) -> Self;
}

/// The first `N` bytes of `bytes`.
#[inline]
pub (crate) fn take<const N: usize>(bytes: &[u8]) -> [u8; N]
{
    let mut out = [0; N];
    out.copy_from_slice(&bytes[.. N]);
    out
}

impl Field for u8
{
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8])
    {
        out[0] = *self;
    }

    fn decode(bytes: &[u8]) -> Self
    {
        bytes[0]
    }
}

impl Field for u64
{
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8])
    {
        out[.. 8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self
    {
        u64::from_le_bytes(take(bytes))
    }
}

impl Field for Block
{
    const SIZE: usize = 24;

    fn encode(&self, out: &mut [u8])
    {
        out[0 .. 4].copy_from_slice(&self.slot().to_le_bytes());
        out[4 .. 8].copy_from_slice(&self.generation().to_le_bytes());
        (self.offset() as u64).encode(&mut out[8 .. 16]);
        (self.size() as u64).encode(&mut out[16 .. 24]);
    }

    fn decode(bytes: &[u8]) -> Self
    {
        Block::new(
            u32::from_le_bytes(take(&bytes[0 .. 4])),
            u32::from_le_bytes(take(&bytes[4 .. 8])),
            u64::decode(&bytes[8 .. 16]) as usize,
            u64::decode(&bytes[16 .. 24]) as usize,
        )
    }
}

/// A presence byte followed by the value, or by zeroes when absent.
impl<T> Field for Option<T>
    where T: Field
{
    const SIZE: usize = 1 + T::SIZE;

    fn encode(&self, out: &mut [u8])
    {
        match self {
            Some(value) => {
                out[0] = 1;
                value.encode(&mut out[1 .. Self::SIZE]);
            },
            None => out[.. Self::SIZE].fill(0),
        }
    }

    fn decode(bytes: &[u8]) -> Self
    {
        (bytes[0] != 0).then(|| T::decode(&bytes[1 .. Self::SIZE]))
    }
}
