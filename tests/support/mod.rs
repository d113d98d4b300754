pub mod mangadex_mock;
pub mod socket_guard;
