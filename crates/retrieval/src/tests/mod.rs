//! Cross-module scenario tests.

mod search_ranking;
