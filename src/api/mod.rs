//! Usage: Typed wrappers over the backend `/api` routes.
//!
//! Every wrapper takes the session explicitly; nothing here holds global client state.

pub mod admin;
pub mod auth;
pub mod games;
pub mod leaderboard;
pub mod models;
pub mod users;

pub use models::*;

pub(crate) const MAX_PAGE_LIMIT: u32 = 100;

pub(crate) fn clamp_page(page: u32) -> u32 {
    page.max(1)
}

pub(crate) fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped() {
        assert_eq!(clamp_page(0), 1);
        assert_eq!(clamp_page(7), 7);
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(20), 20);
        assert_eq!(clamp_limit(500), MAX_PAGE_LIMIT);
    }
}
