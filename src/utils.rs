//! Utility functions for image conversion and numeric casting.

pub mod image_conversion;
pub mod safe_cast;
