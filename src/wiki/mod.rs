//! Wiki backend abstraction layer.
//!
//! - MediaWiki `api.php` over HTTP
//! - In-memory mock for testing

pub mod mediawiki;
pub mod mock;
pub mod traits;

pub use mediawiki::MediaWikiBackend;
pub use mock::MockWiki;
pub use traits::{
    is_anonymous_subject, BlockInfo, BlockRecord, Page, PageEdit, UserInfo, WikiBackend,
    WikiError,
};
