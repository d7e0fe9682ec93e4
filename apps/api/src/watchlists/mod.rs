//! Tier-limited watchlists.

pub mod handlers;

use crate::models::user::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchlistCaps {
    pub lists: usize,
    pub items_per_list: usize,
}

/// Watchlist caps by tier. Admins get elite caps.
pub fn caps_for(tier: Tier, is_admin: bool) -> WatchlistCaps {
    let tier = if is_admin { Tier::Elite } else { tier };
    match tier {
        Tier::Free => WatchlistCaps {
            lists: 1,
            items_per_list: 10,
        },
        Tier::Pro => WatchlistCaps {
            lists: 3,
            items_per_list: 50,
        },
        Tier::Elite => WatchlistCaps {
            lists: 10,
            items_per_list: 200,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_tier_caps() {
        let caps = caps_for(Tier::Free, false);
        assert_eq!(caps.lists, 1);
        assert_eq!(caps.items_per_list, 10);
    }

    #[test]
    fn test_caps_grow_with_tier() {
        assert!(caps_for(Tier::Pro, false).lists > caps_for(Tier::Free, false).lists);
        assert!(caps_for(Tier::Elite, false).lists > caps_for(Tier::Pro, false).lists);
    }

    #[test]
    fn test_admin_gets_elite_caps() {
        assert_eq!(caps_for(Tier::Free, true), caps_for(Tier::Elite, false));
    }
}
