/// Generate the `id` field of a OneNET property-post message.
///
/// OneNET only echoes the id back in its reply; it is a decimal string in
/// `0..10000` with no leading zeros (e.g. `"4821"`).
pub fn generate_message_id() -> String {
    fastrand::u32(0..10_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        for _ in 0..1000 {
            let id = generate_message_id();
            assert!(!id.is_empty() && id.len() <= 4, "Bad length: {}", id);
            assert!(id.chars().all(|c| c.is_ascii_digit()), "Non-digit in: {}", id);
            assert!(id == "0" || !id.starts_with('0'), "Leading zero: {}", id);
        }
    }

    #[test]
    fn test_seeded_is_reproducible() {
        fastrand::seed(7);
        let a = generate_message_id();
        fastrand::seed(7);
        let b = generate_message_id();
        assert_eq!(a, b);
    }
}
