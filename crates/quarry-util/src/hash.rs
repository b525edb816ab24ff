use sha2::{Digest, Sha256};

/// Hash a sequence of `key=value` pairs in the order given.
///
/// Each pair is written as its own line so that `("a", "bc")` and
/// `("ab", "c")` never collide.
pub fn sha256_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = Sha256::new();
    for (key, value) in pairs {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
