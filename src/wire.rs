use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, BytesMut};
use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_util::codec::{Decoder, Encoder, Framed};
use ulid::Ulid;

use crate::auth::PasswordGate;
use crate::model::{Apartment, Event, Runner, Tenant, Visit, WeekSchedule};
use crate::observability;
use crate::scheduler::{Scheduler, SchedulerError};

/// Upper bound on a single frame's JSON payload.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Every store operation gets this long before the request fails
/// `unavailable` (retryable, nothing committed).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Framing ──────────────────────────────────────────────────────

/// Length-prefixed JSON frames: `[u32 be: len][len bytes of JSON]`.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, io::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<Vec<u8>> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, payload: Vec<u8>, dst: &mut BytesMut) -> Result<(), io::Error> {
        if payload.len() > MAX_FRAME_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
        }
        dst.reserve(4 + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

// ── Protocol messages ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Auth {
        password: String,
    },
    CreateApartment {
        #[serde(default)]
        id: Option<Ulid>,
        zone: String,
        #[serde(default)]
        availability: WeekSchedule,
    },
    CreateRunner {
        #[serde(default)]
        id: Option<Ulid>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        availability: WeekSchedule,
    },
    CreateTenant {
        #[serde(default)]
        id: Option<Ulid>,
        #[serde(default)]
        name: Option<String>,
    },
    AssignRunner {
        apartment_id: Ulid,
        runner_id: Ulid,
    },
    ScheduleVisit {
        apartment_id: Ulid,
        tenant_id: Ulid,
        preferred_date: NaiveDate,
    },
    ListVisits {
        apartment_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    },
    VisitCount {
        apartment_id: Ulid,
        date: NaiveDate,
    },
    Watch {
        apartment_id: Ulid,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Body {
    Authenticated,
    ApartmentCreated { apartment: Apartment },
    RunnerCreated { runner: Runner },
    TenantCreated { tenant: Tenant },
    RunnerAssigned,
    VisitScheduled { visit: Visit },
    Visits { visits: Vec<Visit> },
    VisitCount { count: usize },
    Watching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    BadRequest,
    Conflict,
    ServerError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    NoRunnerAssigned,
    AlreadyExists,
    InvalidDate,
    QuotaExceeded,
    ZoneConflict,
    NoSlotAvailable,
    InvalidInput,
    LimitExceeded,
    BadRequest,
    Unauthorized,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(flatten)]
        body: Body,
    },
    Error {
        category: ErrorCategory,
        kind: FailureKind,
        reason: String,
    },
}

fn ok(body: Body) -> Response {
    Response::Ok { body }
}

fn bad_request(reason: String) -> Response {
    Response::Error {
        category: ErrorCategory::BadRequest,
        kind: FailureKind::BadRequest,
        reason,
    }
}

/// Render a scheduler failure with its specific kind; nothing collapses
/// to a generic error.
fn scheduler_error(e: &SchedulerError) -> Response {
    let (category, kind) = match e {
        SchedulerError::NotFound(_) => (ErrorCategory::NotFound, FailureKind::NotFound),
        SchedulerError::NoRunnerAssigned(_) => {
            (ErrorCategory::NotFound, FailureKind::NoRunnerAssigned)
        }
        SchedulerError::AlreadyExists(_) => (ErrorCategory::Conflict, FailureKind::AlreadyExists),
        SchedulerError::InvalidDate(_) => (ErrorCategory::BadRequest, FailureKind::InvalidDate),
        SchedulerError::QuotaExceeded { .. } => {
            (ErrorCategory::BadRequest, FailureKind::QuotaExceeded)
        }
        SchedulerError::ZoneConflict { .. } => (ErrorCategory::Conflict, FailureKind::ZoneConflict),
        SchedulerError::NoSlotAvailable(_) => {
            (ErrorCategory::BadRequest, FailureKind::NoSlotAvailable)
        }
        SchedulerError::InvalidInput(_) => (ErrorCategory::BadRequest, FailureKind::InvalidInput),
        SchedulerError::LimitExceeded(_) => (ErrorCategory::BadRequest, FailureKind::LimitExceeded),
        SchedulerError::Unavailable(_) => (ErrorCategory::ServerError, FailureKind::Unavailable),
        SchedulerError::Internal(_) => (ErrorCategory::ServerError, FailureKind::Internal),
    };
    Response::Error {
        category,
        kind,
        reason: e.to_string(),
    }
}

// ── Connection handling ──────────────────────────────────────────

/// Bound an operation by the request timeout. The future runs on a
/// detached task: a timeout abandons the wait, never a half-done
/// commit, so the store can't be left between journal and memory.
async fn with_timeout<T: Send + 'static>(
    fut: impl Future<Output = Result<T, SchedulerError>> + Send + 'static,
) -> Result<T, SchedulerError> {
    let task = tokio::spawn(fut);
    match tokio::time::timeout(REQUEST_TIMEOUT, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(SchedulerError::Internal(format!(
            "scheduler task failed: {join_error}"
        ))),
        Err(_) => Err(SchedulerError::Unavailable("request timed out".into())),
    }
}

async fn handle_request(
    request: Request,
    scheduler: &Arc<Scheduler>,
    gate: &PasswordGate,
    authenticated: &mut bool,
) -> (Response, Option<broadcast::Receiver<Event>>) {
    if !*authenticated {
        return match request {
            Request::Auth { password } if gate.verify(&password) => {
                *authenticated = true;
                (ok(Body::Authenticated), None)
            }
            Request::Auth { .. } => {
                metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
                (
                    Response::Error {
                        category: ErrorCategory::BadRequest,
                        kind: FailureKind::Unauthorized,
                        reason: "password rejected".into(),
                    },
                    None,
                )
            }
            _ => (
                Response::Error {
                    category: ErrorCategory::BadRequest,
                    kind: FailureKind::Unauthorized,
                    reason: "authenticate first".into(),
                },
                None,
            ),
        };
    }

    let response = match request {
        Request::Auth { .. } => ok(Body::Authenticated),
        Request::CreateApartment {
            id,
            zone,
            availability,
        } => {
            let id = id.unwrap_or_else(Ulid::new);
            let s = scheduler.clone();
            match with_timeout(async move { s.create_apartment(id, zone, availability).await })
                .await
            {
                Ok(apartment) => ok(Body::ApartmentCreated { apartment }),
                Err(e) => scheduler_error(&e),
            }
        }
        Request::CreateRunner {
            id,
            name,
            availability,
        } => {
            let id = id.unwrap_or_else(Ulid::new);
            let s = scheduler.clone();
            match with_timeout(async move { s.create_runner(id, name, availability).await }).await {
                Ok(runner) => ok(Body::RunnerCreated { runner }),
                Err(e) => scheduler_error(&e),
            }
        }
        Request::CreateTenant { id, name } => {
            let id = id.unwrap_or_else(Ulid::new);
            let s = scheduler.clone();
            match with_timeout(async move { s.create_tenant(id, name).await }).await {
                Ok(tenant) => ok(Body::TenantCreated { tenant }),
                Err(e) => scheduler_error(&e),
            }
        }
        Request::AssignRunner {
            apartment_id,
            runner_id,
        } => {
            let s = scheduler.clone();
            match with_timeout(async move { s.assign_runner(apartment_id, runner_id).await }).await
            {
                Ok(()) => ok(Body::RunnerAssigned),
                Err(e) => scheduler_error(&e),
            }
        }
        Request::ScheduleVisit {
            apartment_id,
            tenant_id,
            preferred_date,
        } => {
            let s = scheduler.clone();
            match with_timeout(async move {
                s.schedule_visit(apartment_id, tenant_id, preferred_date).await
            })
            .await
            {
                Ok(visit) => ok(Body::VisitScheduled { visit }),
                Err(e) => scheduler_error(&e),
            }
        }
        Request::ListVisits {
            apartment_id,
            from,
            to,
        } => {
            let s = scheduler.clone();
            match with_timeout(async move { s.list_visits(&apartment_id, from, to).await }).await {
                Ok(visits) => ok(Body::Visits { visits }),
                Err(e) => scheduler_error(&e),
            }
        }
        Request::VisitCount { apartment_id, date } => {
            let count = scheduler.weekly_visit_count(&apartment_id, date).await;
            ok(Body::VisitCount { count })
        }
        Request::Watch { apartment_id } => {
            let rx = scheduler.notify.subscribe(apartment_id);
            return (ok(Body::Watching), Some(rx));
        }
    };
    (response, None)
}

async fn next_watch_event(
    watch: &mut Option<broadcast::Receiver<Event>>,
) -> Result<Event, broadcast::error::RecvError> {
    match watch {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_response<S>(framed: &mut Framed<S, FrameCodec>, response: &Response) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    framed.send(payload).await
}

/// Serve one connection: a request/response loop, interleaved with
/// pushed `visit_scheduled` frames once the client has issued `watch`.
/// A connection carries at most one watch; a later `watch` replaces it.
pub async fn process_connection<S>(
    stream: S,
    scheduler: Arc<Scheduler>,
    gate: PasswordGate,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, FrameCodec);
    let mut authenticated = !gate.required();
    let mut watch: Option<broadcast::Receiver<Event>> = None;

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(frame) = frame else { return Ok(()) };
                let frame = frame?;
                let response = match serde_json::from_slice::<Request>(&frame) {
                    Ok(request) => {
                        let label = observability::op_label(&request);
                        let started = Instant::now();
                        let (response, new_watch) =
                            handle_request(request, &scheduler, &gate, &mut authenticated).await;
                        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => label)
                            .record(started.elapsed().as_secs_f64());
                        let status = match &response {
                            Response::Ok { .. } => "ok",
                            Response::Error { .. } => "error",
                        };
                        metrics::counter!(observability::REQUESTS_TOTAL, "op" => label, "status" => status)
                            .increment(1);
                        if new_watch.is_some() {
                            watch = new_watch;
                        }
                        response
                    }
                    Err(e) => bad_request(format!("malformed request: {e}")),
                };
                send_response(&mut framed, &response).await?;
                if gate.required() && !authenticated {
                    // Unauthenticated exchange is over; drop the connection
                    return Ok(());
                }
            }
            event = next_watch_event(&mut watch) => {
                match event {
                    Ok(Event::VisitScheduled { id, apartment_id, runner_id, tenant_id, date, slot }) => {
                        let visit = Visit {
                            id,
                            apartment_id,
                            runner_id,
                            tenant_id,
                            date,
                            slot,
                            status: crate::model::VisitStatus::Scheduled,
                        };
                        send_response(&mut framed, &ok(Body::VisitScheduled { visit })).await?;
                    }
                    // Administrative events are not pushed to watchers
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("watch subscriber lagged, {missed} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        watch = None;
                    }
                }
            }
        }
    }
}
