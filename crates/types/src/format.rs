/// Inserts `,` between every group of three digits of an unsigned integer
/// string. Input that is not all ascii digits is returned unchanged.
pub fn group_digits(integer: &str) -> String {
    if integer.is_empty() || !integer.bytes().all(|b| b.is_ascii_digit()) {
        return integer.to_string();
    }
    let mut out = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, c) in integer.chars().enumerate() {
        if i != 0 && (integer.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::group_digits;

    #[test]
    fn groups_thousands() {
        assert_eq!(group_digits("0"), "0");
        assert_eq!(group_digits("999"), "999");
        assert_eq!(group_digits("1000"), "1,000");
        assert_eq!(group_digits("1234567"), "1,234,567");
        assert_eq!(group_digits("420690000000000"), "420,690,000,000,000");
        assert_eq!(group_digits("12a"), "12a");
    }
}
