//! State module for link checking
//!
//! # Components
//!
//! - `LinkType`: The role a URL plays in a catalog record (shown at / shown by)
//! - `CheckingResult`: Whether a link has been checked and what the outcome was

mod link_state;

pub use link_state::{CheckingResult, LinkType};
