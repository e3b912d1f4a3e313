pub mod challenge;
pub mod chromium_session;
pub mod console_notifier;
pub mod discord_notifier;
pub mod fake_session;
pub mod memory_store;
pub mod multi_notifier;
pub mod profile_fetcher;
pub mod profile_page;
pub mod sqlite_store;
pub mod stealth;
