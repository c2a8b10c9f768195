// services/phone.rs
use crate::models::payment::PhoneValidation;

const COUNTRY_CODE: &str = "254";

fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Rewrites a Kenyan phone number into the digits-only `254XXXXXXXXX` form
/// Daraja expects. Total: garbage in still yields a `254`-prefixed string.
pub fn normalize_phone_number(phone: &str) -> String {
    let digits = digits_only(phone);

    if let Some(rest) = digits.strip_prefix('0') {
        return format!("{}{}", COUNTRY_CODE, rest);
    }
    // Bare subscriber numbers (7xx, 1xx) and anything unrecognised get the
    // country code prepended.
    if digits.starts_with(COUNTRY_CODE) {
        return digits;
    }
    format!("{}{}", COUNTRY_CODE, digits)
}

fn is_mobile_number(normalized: &str) -> bool {
    let Some(subscriber) = normalized.strip_prefix(COUNTRY_CODE) else {
        return false;
    };
    subscriber.len() == 9
        && subscriber.starts_with(&['7', '1'][..])
        && subscriber.chars().all(|c| c.is_ascii_digit())
}

pub fn validate_phone_number(phone: &str) -> PhoneValidation {
    let digit_count = digits_only(phone).len();
    if digit_count < 9 {
        return PhoneValidation::invalid("Phone number is too short");
    }
    if digit_count > 12 {
        return PhoneValidation::invalid("Phone number is too long");
    }

    let normalized = normalize_phone_number(phone);
    if !normalized.starts_with(COUNTRY_CODE) {
        return PhoneValidation::invalid("Phone number is not a valid Kenyan number");
    }
    if !is_mobile_number(&normalized) {
        return PhoneValidation::invalid("Phone number is not a valid mobile number");
    }

    PhoneValidation::valid()
}
