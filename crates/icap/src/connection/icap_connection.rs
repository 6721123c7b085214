use std::error::Error;
use std::io;
use std::io::ErrorKind;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::{Handler, Outcome};
use crate::preview::PreviewBudget;
use crate::protocol::{
    IcapError, IcapRequest, IcapResponse, IcapStatus, Message, ParseError, PayloadItem, RequestHeader, ResponseHead, SendError,
};

const CONTINUE_RESPONSE: &[u8] = b"ICAP/1.0 100 Continue\r\n\r\n";

/// A server side ICAP connection.
///
/// Requests are handled strictly one after another: the head, the body or preview, the
/// handler's decision, and an optional continuation all complete before the next head
/// is read. Protocol errors are answered with `400 Bad Request` and close the
/// connection, since the framing can no longer be trusted.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct IcapConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
}

impl<R, W> IcapConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
        }
    }

    pub async fn process<H: Handler>(mut self, handler: Arc<H>) -> Result<(), IcapError> {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header(header))) => {
                    self.do_process(header, &handler).await?;
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive body while expecting an icap head");
                    self.send_response(IcapResponse::status_only(IcapStatus::BAD_REQUEST)).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    if !matches!(e, ParseError::Io { .. }) {
                        self.send_response(IcapResponse::status_only(IcapStatus::BAD_REQUEST)).await?;
                    }
                    return Err(e.into());
                }

                None => {
                    info!("can't read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    async fn do_process<H: Handler>(&mut self, header: RequestHeader, handler: &Arc<H>) -> Result<(), IcapError> {
        let (body, complete) = match self.read_body(&header).await {
            Ok(read) => read,
            Err(e) => return self.abort(e).await,
        };

        let mut request = IcapRequest::new(header, body, complete);

        loop {
            match handler.call(&request).await {
                Ok(Outcome::Respond(response)) => return self.send_response(response).await,

                Ok(Outcome::Continue) if !request.is_complete() => {
                    self.send_continue().await?;
                    match self.read_continuation(&request).await {
                        Ok(rest) => request.complete_with(rest),
                        Err(e) => return self.abort(e).await,
                    }
                }

                Ok(Outcome::Continue) => {
                    error!(method = %request.method(), "handler asked to continue a complete request");
                    return self.send_response(IcapResponse::status_only(IcapStatus::INTERNAL_SERVER_ERROR)).await;
                }

                Err(e) => {
                    let e: Box<dyn Error + Send + Sync> = e.into();
                    error!(method = %request.method(), cause = %e, "handle request error");
                    return self.send_response(IcapResponse::status_only(IcapStatus::INTERNAL_SERVER_ERROR)).await;
                }
            }
        }
    }

    /// Reads the body, or the preview when the client announced one.
    ///
    /// Returns the bytes and whether they are the whole body.
    async fn read_body(&mut self, header: &RequestHeader) -> Result<(Bytes, bool), IcapError> {
        let mut budget = header.preview().filter(|_| header.has_body()).map(PreviewBudget::new);
        let mut body = BytesMut::new();

        loop {
            match self.next_payload().await? {
                PayloadItem::Chunk(bytes) => {
                    if let Some(budget) = &mut budget {
                        budget.record(bytes.len())?;
                    }
                    body.extend_from_slice(&bytes);
                }
                end => {
                    let complete = match &budget {
                        Some(budget) => {
                            budget.finish(end.is_ieof())?;
                            end.is_ieof()
                        }
                        None => true,
                    };
                    return Ok((body.freeze(), complete));
                }
            }
        }
    }

    /// Reads the rest of a previewed body after `100 Continue`.
    async fn read_continuation(&mut self, request: &IcapRequest) -> Result<Bytes, IcapError> {
        self.framed_read.decoder_mut().continue_payload();

        let mut rest = BytesMut::new();
        while let PayloadItem::Chunk(bytes) = self.next_payload().await? {
            rest.extend_from_slice(&bytes);
        }

        if let Some(expected) = request.envelope().content_length() {
            let total = (request.body().len() + rest.len()) as u64;
            if total != expected {
                return Err(IcapError::preview_violation(format!(
                    "continuation brought the body to {total} bytes, Content-Length is {expected}"
                )));
            }
        }

        Ok(rest.freeze())
    }

    async fn next_payload(&mut self) -> Result<PayloadItem, IcapError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => Err(ParseError::invalid_body("receive header while reading body").into()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ParseError::io(io::Error::from(ErrorKind::UnexpectedEof)).into()),
        }
    }

    async fn send_continue(&mut self) -> Result<(), IcapError> {
        let writer = self.framed_write.get_mut();
        writer.write_all(CONTINUE_RESPONSE).await.map_err(SendError::io)?;
        writer.flush().await.map_err(SendError::io)?;
        info!("sent continue response after preview");
        Ok(())
    }

    /// Answers a client fault with `400 Bad Request`, then gives up on the connection.
    async fn abort(&mut self, e: IcapError) -> Result<(), IcapError> {
        warn!(cause = %e, "abort request");
        if e.is_client_fault() {
            self.send_response(IcapResponse::status_only(IcapStatus::BAD_REQUEST)).await?;
        }
        Err(e)
    }

    async fn send_response(&mut self, response: IcapResponse) -> Result<(), IcapError> {
        let (head, body) = response.into_parts();

        if !head.has_body() {
            self.framed_write.send(Message::<_, Bytes>::Header(head)).await?;
            return Ok(());
        }

        // feed instead of send, the head and body are flushed together
        self.framed_write.feed(Message::<_, Bytes>::Header(head)).await?;
        if let Some(body) = body.filter(|body| !body.is_empty()) {
            self.framed_write.feed(Message::<ResponseHead, _>::Payload(PayloadItem::Chunk(body))).await?;
        }
        self.framed_write.send(Message::<ResponseHead, _>::Payload(PayloadItem::<Bytes>::Eof)).await?;
        Ok(())
    }
}
