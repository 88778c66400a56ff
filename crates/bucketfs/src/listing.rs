//! Paginated bucket listing as a lazy stream

use bucketfs_core::ClientError;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::client::{fields, ClientResult, ListPage, ListRequest, ObjectClient, RawEntry};

/// A listing that can be enumerated from the start any number of times
///
/// Each call to [`Listing::entries`] reissues the first request; a stream
/// that was dropped early cannot be resumed.
pub struct Listing<'a, C: ?Sized> {
    client: &'a C,
    request: ListRequest,
}

enum Cursor {
    First,
    Next(String),
    Done,
}

impl<'a, C: ObjectClient + ?Sized> Listing<'a, C> {
    /// # Arguments
    /// * `prefix` - Storage key prefix to list under
    /// * `delimiter` - `Some("/")` for a single level, `None` for everything below
    /// * `max_keys` - Page size hint
    pub fn new(client: &'a C, prefix: String, delimiter: Option<&str>, max_keys: Option<u32>) -> Self {
        Self {
            client,
            request: ListRequest {
                prefix,
                delimiter: delimiter.map(String::from),
                continuation_token: None,
                max_keys,
            },
        }
    }

    /// Raw entries in service order
    ///
    /// Per page, common prefixes come first (as entries with a `Prefix`
    /// field) followed by the objects. The marker object whose key equals
    /// the listed prefix is skipped. A failing page ends the stream with
    /// that error.
    pub fn entries(&self) -> BoxStream<'a, ClientResult<RawEntry>> {
        let client = self.client;
        let request = self.request.clone();

        let pages = stream::try_unfold(Cursor::First, move |cursor| {
            let request = request.clone();
            async move {
                let continuation_token = match cursor {
                    Cursor::First => None,
                    Cursor::Next(token) => Some(token),
                    Cursor::Done => return Ok(None),
                };

                debug!(prefix = %request.prefix, ?continuation_token, "Fetching listing page");
                let page = client
                    .list_objects(&ListRequest {
                        continuation_token,
                        ..request
                    })
                    .await?;

                let next = match &page.next_continuation_token {
                    Some(token) if !token.is_empty() => Cursor::Next(token.clone()),
                    _ => Cursor::Done,
                };
                Ok(Some((page, next)))
            }
        });

        let marker = self.request.prefix.clone();
        pages
            .map_ok(move |page| stream::iter(page_entries(page, &marker).map(Ok::<_, ClientError>)))
            .try_flatten()
            .boxed()
    }
}

fn page_entries(page: ListPage, marker: &str) -> impl Iterator<Item = RawEntry> {
    let marker = marker.to_string();
    let prefixes = page
        .common_prefixes
        .into_iter()
        .map(|prefix| RawEntry::new().with(fields::PREFIX, prefix));
    let contents = page
        .contents
        .into_iter()
        .filter(move |entry| marker.is_empty() || entry.get_str(fields::KEY) != Some(marker.as_str()));
    prefixes.chain(contents)
}
