//! Typed IPC channel (C7): an in-process async actor realization of the
//! cross-tier request/reply and callback message bus.
//!
//! Each logical endpoint owns an `mpsc` channel carrying a closed message
//! type. Request/response correlation rides on a `oneshot` channel embedded
//! in the call itself rather than a free-standing id table; callbacks are
//! delivered as plain fire-and-forget sends, keeping notification semantics
//! distinct from request/response.

use surrogate_shared::{SurrogateError, SurrogateResult};
use tokio::sync::{mpsc, oneshot};

/// One request crossing a channel boundary, carrying its own reply sender.
pub struct Call<Req, Resp> {
    pub payload: Req,
    pub reply: oneshot::Sender<Resp>,
}

pub type CallTx<Req, Resp> = mpsc::UnboundedSender<Call<Req, Resp>>;
pub type CallRx<Req, Resp> = mpsc::UnboundedReceiver<Call<Req, Resp>>;

pub fn call_channel<Req, Resp>() -> (CallTx<Req, Resp>, CallRx<Req, Resp>) {
    mpsc::unbounded_channel()
}

/// Send `payload` across `tx` and await the matching reply.
///
/// Fails with `DispatchError` if the receiving endpoint has shut down
/// (request channel closed) or dropped the call without replying.
pub async fn call<Req, Resp>(tx: &CallTx<Req, Resp>, payload: Req) -> SurrogateResult<Resp> {
    let (reply, rx) = oneshot::channel();
    tx.send(Call { payload, reply })
        .map_err(|_| SurrogateError::Dispatch("request channel closed".to_string()))?;
    rx.await
        .map_err(|_| SurrogateError::Dispatch("reply dropped before response".to_string()))
}

/// Fire-and-forget channel for callbacks.
pub type CallbackTx<Msg> = mpsc::UnboundedSender<Msg>;
pub type CallbackRx<Msg> = mpsc::UnboundedReceiver<Msg>;

pub fn callback_channel<Msg>() -> (CallbackTx<Msg>, CallbackRx<Msg>) {
    mpsc::unbounded_channel()
}
