//! Backend collaborator interface.
//!
//! The pipeline only talks to the trail store through this trait. How the
//! implementation authenticates (and how often) is its own business; the
//! PocketBase client in [`crate::http`] signs in once and reuses the token.

use crate::error::Result;
use crate::model::{Category, Trail};

/// Storage/query service holding trails and their GPX files.
#[allow(async_fn_in_trait)]
pub trait TrailBackend {
    /// All trail categories.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// All public trails, in backend order.
    async fn list_public_trails(&self) -> Result<Vec<Trail>>;

    /// Id of the local actor with this display name, if any.
    async fn find_notification_author(&self, name: &str) -> Result<Option<String>>;

    /// Raw bytes of the trail's stored GPX file.
    async fn download_trail_file(&self, trail: &Trail) -> Result<Vec<u8>>;

    /// Replace the trail's stored GPX file.
    async fn upload_trail_file(&self, trail: &Trail, data: Vec<u8>, file_name: &str)
        -> Result<()>;

    /// Post a notification comment on a trail.
    async fn create_notification(&self, trail_id: &str, author_id: &str, text: &str)
        -> Result<()>;
}
