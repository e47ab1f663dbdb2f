//! Various utilities

pub mod bitset;
pub mod hash;
pub mod to_vk;
