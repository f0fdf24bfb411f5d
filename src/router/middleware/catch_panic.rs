use std::{
    any::Any,
    backtrace::Backtrace,
    fmt,
    panic::AssertUnwindSafe,
    pin::Pin,
    collections::HashMap,
    sync::{Arc, Mutex},
    thread::{self, ThreadId},
};

use axum::{
    body::{Body, BoxBody},
    extract::State,
    http::{Request, Response},
    middleware::{FromFnLayer, Next},
};
use futures::{Future, FutureExt};
use tracing::warn;
use tracing_error::SpanTrace;

use super::request_metadata::RequestMetadata;

#[derive(Debug)]
pub struct CaughtPanic {
    payload: Box<dyn Any + Send + 'static>,
    info: Option<PanicInfo>,
}

impl CaughtPanic {
    pub fn payload_str(&self) -> Option<&str> {
        if let Some(s) = self.payload.downcast_ref::<String>() {
            Some(s.as_str())
        } else if let Some(s) = self.payload.downcast_ref::<&str>() {
            Some(s)
        } else {
            None
        }
    }

    pub fn location(&self) -> Option<&Location> {
        self.info.as_ref()?.location.as_ref()
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.info.as_ref().map(|info| &info.backtrace)
    }

    pub fn span_trace(&self) -> Option<&SpanTrace> {
        self.info.as_ref().map(|info| &info.span_trace)
    }
}

#[derive(Debug)]
struct PanicInfo {
    location: Option<Location>,
    backtrace: Backtrace,
    span_trace: SpanTrace,
}

#[derive(Debug)]
pub struct Location {
    file: String,
    line: u32,
    column: u32,
}

impl<'a> From<&'a std::panic::Location<'a>> for Location {
    fn from(location: &'a std::panic::Location<'a>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Panics recorded by the hook, keyed by the thread that panicked. The
/// request that panicked unwinds into [`catch_panic`] on that same thread
/// before the thread runs anything else, so it claims its own record even
/// when other requests panic concurrently.
#[derive(Debug, Clone, Default)]
struct PanicSlot(Arc<Mutex<HashMap<ThreadId, PanicInfo>>>);

impl PanicSlot {
    fn record(&self, info: &std::panic::PanicInfo<'_>) {
        let recorded = PanicInfo {
            location: info.location().map(Location::from),
            backtrace: Backtrace::force_capture(),
            span_trace: SpanTrace::capture(),
        };

        let thread = thread::current().id();
        match self.0.lock() {
            Ok(mut slot) => slot.insert(thread, recorded),
            Err(poisoned) => poisoned.into_inner().insert(thread, recorded),
        };
    }

    fn take(&self) -> Option<PanicInfo> {
        let thread = thread::current().id();
        match self.0.lock() {
            Ok(mut slot) => slot.remove(&thread),
            Err(poisoned) => poisoned.into_inner().remove(&thread),
        }
    }
}

#[derive(Clone)]
pub struct CatchPanicState {
    slot: PanicSlot,
    handler: CatchPanicHandler,
}

/// Install a panic hook feeding `handler`. The previous hook still runs, so
/// sentry's panic integration keeps reporting. Every call chains one more
/// global hook, so build the layer once per server.
pub fn catch_panic_layer<T>(
    handler: CatchPanicHandler,
) -> FromFnLayer<CatchPanicFn, CatchPanicState, T> {
    let slot = PanicSlot::default();

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new({
        let slot = slot.clone();

        move |info| {
            slot.record(info);
            previous_hook(info)
        }
    }));

    axum::middleware::from_fn_with_state(
        CatchPanicState { slot, handler },
        catch_panic as CatchPanicFn,
    )
}

pub type CatchPanicFn = fn(
    State<CatchPanicState>,
    RequestMetadata,
    Request<Body>,
    Next<Body>,
) -> Pin<Box<dyn Future<Output = Response<BoxBody>> + Send + 'static>>;

pub type CatchPanicHandler = fn(RequestMetadata, CaughtPanic) -> Response<BoxBody>;

/// Like [`tower_http::catch_panic::CatchPanicLayer`], but the handler also
/// gets the request id and where the panic happened
fn catch_panic(
    State(CatchPanicState { slot, handler }): State<CatchPanicState>,
    request_metadata: RequestMetadata,
    request: Request<Body>,
    next: Next<Body>,
) -> Pin<Box<dyn Future<Output = Response<BoxBody>> + Send + 'static>> {
    Box::pin(async move {
        // Panics can happen while building the future or while polling it
        let payload = match std::panic::catch_unwind(AssertUnwindSafe(move || next.run(request)))
        {
            Ok(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(response) => return response,
                Err(payload) => payload,
            },
            Err(payload) => payload,
        };

        let info = slot.take();
        if info.is_none() {
            warn!("panic hook did not record any information for this panic");
        }

        handler(request_metadata, CaughtPanic { payload, info })
    })
}
