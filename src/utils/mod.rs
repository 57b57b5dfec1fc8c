pub mod time;

/// Generates a 21 character url-safe id.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Generates a random v4 uuid string.
pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
