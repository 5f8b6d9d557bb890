use crate::clients::{CriticalClient, FetchHints, OptionalClient};
use crate::errors::Result;
use crate::types::{Post, PostId};
use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral local port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub fn post(post_id: PostId) -> Post {
    Post {
        post_id,
        type_of_post: "reel".into(),
        post_caption: "fun".into(),
        posted_on: None,
        service_address: Some("post-0:8080".into()),
    }
}

/// Critical client that replays a script of results, then repeats a fallback.
pub struct ScriptedCritical {
    script: Mutex<VecDeque<Result<Post>>>,
    fallback: Result<Post>,
    delay: Duration,
    calls: AtomicUsize,
    last_hints: Mutex<Option<FetchHints>>,
}

impl ScriptedCritical {
    pub fn always(result: Result<Post>) -> Self {
        Self::sequence(vec![], result)
    }

    pub fn sequence(script: Vec<Result<Post>>, fallback: Result<Post>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_hints: Mutex::new(None),
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_hints(&self) -> Option<FetchHints> {
        *self.last_hints.lock()
    }
}

#[async_trait]
impl CriticalClient for ScriptedCritical {
    async fn fetch_one(&self, _post_id: PostId, hints: FetchHints) -> Result<Post> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_hints.lock() = Some(hints);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Optional client with a fixed answer.
pub struct FakeOptional<T> {
    result: Result<Vec<T>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl<T> FakeOptional<T> {
    pub fn returning(records: Vec<T>) -> Self {
        Self::new(Ok(records))
    }

    pub fn failing(error: crate::errors::CompositeError) -> Self {
        Self::new(Err(error))
    }

    fn new(result: Result<Vec<T>>) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> OptionalClient<T> for FakeOptional<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn fetch_many(&self, _post_id: PostId) -> Result<Vec<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}
