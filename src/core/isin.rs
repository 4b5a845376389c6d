//! ISIN format and checksum validation.

/// Returns true when `isin` has the ISO 6166 shape (two letters, nine
/// alphanumerics, one digit) and its Luhn check digit is correct.
pub fn is_valid(isin: &str) -> bool {
    has_valid_format(isin) && has_valid_checksum(isin)
}

pub fn has_valid_format(isin: &str) -> bool {
    let bytes = isin.as_bytes();
    bytes.len() == 12
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..11]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        && bytes[11].is_ascii_digit()
}

fn has_valid_checksum(isin: &str) -> bool {
    // Letters expand to two digits (A=10 .. Z=35) before the Luhn pass.
    let digits: Vec<u32> = isin
        .chars()
        .filter_map(|c| c.to_digit(36))
        .flat_map(|v| {
            if v >= 10 {
                vec![v / 10, v % 10]
            } else {
                vec![v]
            }
        })
        .collect();

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}
