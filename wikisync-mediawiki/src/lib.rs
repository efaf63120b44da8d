//! # wikisync-mediawiki
//!
//! A [`RemoteService`](wikisync_core::RemoteService) backed by the MediaWiki
//! Action API: bot-password login, revision fetch, and `action=edit` with
//! `nocreate` (edit) or `createonly` (create).

pub mod api;
pub mod client;

pub use api::ApiSession;
pub use client::MediaWikiClient;
