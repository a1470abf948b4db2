//! Fixed platform catalog.
//!
//! The order here is the render order of the toggle keyboard and is never
//! mutated at runtime.

/// Catalog entry that triggers the free-text "other platforms" prompt.
pub const OTHERS: &str = "Others";

pub const PLATFORMS: [&str; 8] = [
    "Facebook",
    "Instagram",
    "YouTube",
    "Brand's Website",
    "Lazada",
    "Shopee",
    "TikTok",
    OTHERS,
];

pub fn is_known(name: &str) -> bool {
    PLATFORMS.contains(&name)
}
