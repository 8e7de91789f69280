use formats::PreparedAsset;
use foundation::ids::AssetUrl;
use runtime::mailbox::MailboxSender;
use tracing::warn;

use crate::error::AssetLoadError;

pub type LoadResult = Result<PreparedAsset, AssetLoadError>;

/// A finished load, waiting in the cache's mailbox.
#[derive(Debug)]
pub struct LoadCompletion {
    pub url: AssetUrl,
    pub result: LoadResult,
}

/// One outstanding fetch handed to an [`AssetSource`](crate::AssetSource).
///
/// Consumed by [`LoadRequest::complete`], so a request is answered at most
/// once. A request dropped unanswered replies with a worker error, so its
/// record cannot stay pending.
#[derive(Debug)]
pub struct LoadRequest {
    url: AssetUrl,
    reply: Option<MailboxSender<LoadCompletion>>,
}

impl LoadRequest {
    pub fn new(url: AssetUrl, reply: MailboxSender<LoadCompletion>) -> Self {
        Self {
            url,
            reply: Some(reply),
        }
    }

    pub fn url(&self) -> &AssetUrl {
        &self.url
    }

    /// Delivers the result. Returns `false` if the cache is gone.
    pub fn complete(mut self, result: LoadResult) -> bool {
        self.reply_with(result)
    }

    fn reply_with(&mut self, result: LoadResult) -> bool {
        let Some(reply) = self.reply.take() else {
            return false;
        };
        reply
            .post(LoadCompletion {
                url: self.url.clone(),
                result,
            })
            .is_ok()
    }
}

impl Drop for LoadRequest {
    fn drop(&mut self) {
        if self.reply.is_some() {
            warn!(url = %self.url, "load request dropped without a reply");
            self.reply_with(Err(AssetLoadError::Worker("request dropped".into())));
        }
    }
}
