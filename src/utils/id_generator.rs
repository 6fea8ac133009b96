// src/utils/id_generator.rs
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    Request, // X-Request-Id sent with every backend call
    Event,   // Lifecycle events handed to notifiers
    Session, // One tracking session of one order
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Request => "req",
            IdType::Event => "evt",
            IdType::Session => "trk",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// Generate an ID with format: {prefix}-{yymmdd}-{random_suffix}
    /// where random_suffix is 3 hexchars + 2 alphanumeric or the other way round.
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d").to_string();
        let random_suffix = Self::generate_random_suffix();

        format!("{}-{}-{}", id_type.to_prefix(), date_part, random_suffix)
    }

    fn generate_random_suffix() -> String {
        if rand::random::<bool>() {
            format!("{}{}", Self::generate_hex_chars(3), Self::generate_alphanumeric_chars(2))
        } else {
            format!("{}{}", Self::generate_alphanumeric_chars(3), Self::generate_hex_chars(2))
        }
    }

    fn generate_hex_chars(n: usize) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        Self::generate_from_chars(HEX_CHARS, n)
    }

    fn generate_alphanumeric_chars(n: usize) -> String {
        const ALPHANUMERIC_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        Self::generate_from_chars(ALPHANUMERIC_CHARS, n)
    }

    fn generate_from_chars(charset: &[u8], n: usize) -> String {
        let mut rng = rand::rng();
        (0..n)
            .map(|_| charset[rng.random_range(0..charset.len())] as char)
            .collect()
    }
}

pub fn generate_request_id() -> String {
    IdGenerator::generate(IdType::Request)
}

pub fn generate_session_id() -> String {
    IdGenerator::generate(IdType::Session)
}
