use rand::Rng;

/// A random string of `n` lowercase letters.
pub fn rand_str(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_str_is_lowercase_ascii() {
        let s = rand_str(16);
        assert_eq!(s.len(), 16);
        assert!(s.bytes().all(|b| b.is_ascii_lowercase()));
    }

    #[test]
    fn rand_str_is_unlikely_to_collide() {
        assert_ne!(rand_str(16), rand_str(16));
    }
}
