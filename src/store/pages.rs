//! Lazy page-by-page bucket listings.

use crate::core::{ObjectSummary, StoreError};
use crate::store::ObjectStore;

use futures::stream::{self, Stream};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Streams a bucket listing one page at a time.
///
/// Each page is requested only when the previous one has been consumed, so
/// memory stays bounded by the page size.
pub fn list_pages<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    prefix: Option<&'a str>,
) -> impl Stream<Item = Result<Vec<ObjectSummary>, StoreError>> + Send + 'a {
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let token = match cursor {
            Cursor::Done => return Ok(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };
        let page = store.list_page(bucket, prefix, token).await?;
        let next = match page.next_token {
            Some(token) => Cursor::Next(token),
            None => Cursor::Done,
        };
        Ok::<_, StoreError>(Some((page.objects, next)))
    })
}
