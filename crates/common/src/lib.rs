//! Shared types and address utilities used across all wablast crates.

pub mod phone;
pub mod types;

pub use {
    phone::{DEFAULT_COUNTRY_CODE, normalize_number},
    types::{
        DeliveryRecord, DeliveryStatus, Identity, InboundMessage, Target, is_group_address,
        is_status_address, parse_target_lines,
    },
};
