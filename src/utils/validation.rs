use data_encoding::BASE64;
use once_cell::sync::Lazy;
use regex::Regex;

static MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").unwrap());
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static ACCOUNT_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());
static ROUTING_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{4,20}$").unwrap());

/// Largest accepted identity-document scan, after base64 decoding.
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

const DOCUMENT_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

pub fn validate_mobile(mobile: &str) -> bool {
    MOBILE.is_match(mobile)
}

pub fn validate_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn validate_account_number(account_number: &str) -> bool {
    ACCOUNT_NUMBER.is_match(account_number)
}

/// Routing codes (IFSC) are short alphanumeric institution identifiers.
pub fn validate_routing_code(code: &str) -> bool {
    ROUTING_CODE.is_match(code)
}

/// Checks an uploaded identity document encoded as
/// `data:<mime>;base64,<payload>`.
pub fn validate_document_payload(payload: &str) -> Result<(), String> {
    let rest = payload
        .strip_prefix("data:")
        .ok_or_else(|| "Document must be a data URL".to_string())?;
    let (mime, data) = rest
        .split_once(";base64,")
        .ok_or_else(|| "Document must be base64 encoded".to_string())?;

    if !DOCUMENT_MIME_TYPES.contains(&mime) {
        return Err(format!(
            "Invalid MIME type: {}. Allowed: image/jpeg, image/png, application/pdf",
            mime
        ));
    }

    let decoded = BASE64
        .decode(data.as_bytes())
        .map_err(|_| "Invalid base64 data".to_string())?;
    if decoded.is_empty() {
        return Err("Document is empty".to_string());
    }
    if decoded.len() > MAX_DOCUMENT_BYTES {
        return Err("Document size exceeds 5MB limit".to_string());
    }
    Ok(())
}

/// A random number in 100000..=999999, as used for customer ids and
/// account numbers.
pub fn generate_six_digits() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let n: u32 = rng.gen_range(100000..=999999);
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_and_email() {
        assert!(validate_mobile("9876543210"));
        assert!(!validate_mobile("1234567890"));
        assert!(!validate_mobile("98765"));
        assert!(validate_email("asha.k@example.co.in"));
        assert!(!validate_email("asha@"));
    }

    #[test]
    fn account_numbers_and_routing_codes() {
        assert!(validate_account_number("123456"));
        assert!(!validate_account_number("12345"));
        assert!(!validate_account_number("12a456"));
        assert!(validate_routing_code("MODB0000001"));
        assert!(!validate_routing_code("MO"));
        assert!(!validate_routing_code("MODB 0001"));
    }

    #[test]
    fn patterns_are_shared_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..50).all(|_| {
                        validate_routing_code("othr0000002")
                            && validate_account_number("654321")
                            && !validate_email("not-an-email")
                    })
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn document_payloads() {
        let png = format!("data:image/png;base64,{}", BASE64.encode(b"\x89PNG fake"));
        assert_eq!(validate_document_payload(&png), Ok(()));

        assert!(validate_document_payload("plain text").is_err());
        assert!(validate_document_payload("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(validate_document_payload("data:image/png;base64,%%%").is_err());
        assert!(validate_document_payload("data:image/png;base64,").is_err());
    }

    #[test]
    fn six_digit_numbers() {
        for _ in 0..100 {
            let n = generate_six_digits();
            assert!(validate_account_number(&n), "{}", n);
            assert!(!n.starts_with('0'));
        }
    }
}
