use crate::error::{ChainFsError, Result};

pub(crate) fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)
        .map_err(|e| ChainFsError::Config(format!("system rng unavailable: {e}")))?;
    Ok(buf)
}

/// Random lowercase-hex string of `2 * N` characters; used for opaque block
/// ids and metadata.
pub(crate) fn random_hex<const N: usize>() -> Result<String> {
    Ok(hex::encode(random_array::<N>()?))
}
