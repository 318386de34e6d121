/// Canonical type → human-friendly display name, consolidating the two
/// overlapping tables the original source kept in separate modules
/// (`mailq/shared/constants.py::TYPE_FRIENDLY_NAMES` and an inline dict in
/// `gmail_link_builder.py`'s footer renderer). Used by both the footer line
/// and `noise_breakdown` rendering.
pub fn friendly_type_name(coarse_type: &str) -> &'static str {
    match coarse_type {
        "newsletter" => "newsletters",
        "notification" => "notifications",
        "promotion" => "promotions",
        "receipt" => "receipts",
        "event" => "events",
        "message" => "messages",
        "otp" => "verification codes",
        "shipping" => "shipments",
        "order" => "orders",
        _ => "other",
    }
}

/// Singular form, used when a count of exactly one is being rendered.
pub fn friendly_type_name_singular(coarse_type: &str) -> &'static str {
    match coarse_type {
        "newsletter" => "newsletter",
        "notification" => "notification",
        "promotion" => "promotion",
        "receipt" => "receipt",
        "event" => "event",
        "message" => "message",
        "otp" => "verification code",
        "shipping" => "shipment",
        "order" => "order",
        _ => "other item",
    }
}
