use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::header::{ALLOW, HOST};
use http::{HeaderMap, HeaderValue, Uri};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::ensure;
use crate::preview::{PreviewState, ServiceOptions};
use crate::protocol::headers::PREVIEW;
use crate::protocol::{
    ALLOW_204_VALUE, ClientError, HttpEnvelope, IcapResponse, IcapStatus, Message, Method, PayloadItem, RequestHeader,
};

/// The registered ICAP port
pub const DEFAULT_PORT: u16 = 1344;

/// A client for one remote ICAP service, e.g. `icap://scanner.internal:1344/avscan`.
///
/// Every exchange opens its own connection and is bounded by the client's timeout.
/// REQMOD and RESPMOD bodies are previewed when the service's OPTIONS announced a
/// preview size; the continuation after `100 Continue` is sent without involving the
/// caller.
#[derive(Debug)]
pub struct IcapClient {
    endpoint: Uri,
    address: String,
    host: HeaderValue,
    timeout: Duration,
    options: OnceCell<ServiceOptions>,
}

impl IcapClient {
    pub fn new(endpoint: Uri, timeout: Duration) -> Result<Self, ClientError> {
        ensure!(endpoint.scheme_str() == Some("icap"), ClientError::invalid_endpoint(format!("{endpoint} is not an icap uri")));
        let authority = endpoint.authority().ok_or_else(|| ClientError::invalid_endpoint(format!("{endpoint} has no host")))?;

        let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(DEFAULT_PORT));
        let host = HeaderValue::from_str(authority.as_str()).map_err(ClientError::invalid_endpoint)?;

        Ok(Self { endpoint, address, host, timeout, options: OnceCell::new() })
    }

    #[inline]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The service's OPTIONS, fetched on first use and kept for the life of the client.
    pub async fn options(&self) -> Result<&ServiceOptions, ClientError> {
        self.options
            .get_or_try_init(|| async {
                let response = self.fetch_options().await?;
                Ok(ServiceOptions::from_response(&response))
            })
            .await
    }

    /// Sends a fresh OPTIONS request.
    pub async fn fetch_options(&self) -> Result<IcapResponse, ClientError> {
        self.deadline(self.exchange(Method::Options, HeaderMap::new(), HttpEnvelope::default(), None, None)).await
    }

    /// Sends a REQMOD or RESPMOD request carrying `envelope` and `body`, and returns the
    /// final response.
    pub async fn send(
        &self,
        method: Method,
        headers: HeaderMap,
        envelope: HttpEnvelope,
        body: Option<Bytes>,
    ) -> Result<IcapResponse, ClientError> {
        let preview = match &body {
            Some(_) if method.is_modification() => self.options().await?.preview,
            _ => None,
        };

        self.deadline(self.exchange(method, headers, envelope, body, preview)).await
    }

    async fn deadline<T, F>(&self, future: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        tokio::time::timeout(self.timeout, future).await.map_err(|_| ClientError::Timeout(self.timeout))?
    }

    async fn exchange(
        &self,
        method: Method,
        mut headers: HeaderMap,
        envelope: HttpEnvelope,
        body: Option<Bytes>,
        preview: Option<usize>,
    ) -> Result<IcapResponse, ClientError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|source| ClientError::Connect { address: self.address.clone(), source })?;
        let (reader, writer) = stream.into_split();
        let mut framed_read = FramedRead::with_capacity(reader, ResponseDecoder::new(), 8 * 1024);
        let mut framed_write = FramedWrite::new(writer, RequestEncoder::new());

        let mut state = preview.filter(|_| body.is_some()).map(PreviewState::new);
        let body = match (&mut state, body) {
            (Some(state), Some(body)) => {
                let preview = state.take_preview(body);
                headers.insert(PREVIEW, HeaderValue::from(state.bytes_sent()));
                Some(preview)
            }
            (_, body) => body,
        };

        headers.insert(HOST, self.host.clone());
        headers.insert(ALLOW, ALLOW_204_VALUE);

        let header = RequestHeader::new(method, self.endpoint.clone(), headers, envelope, body.is_some());
        debug!(%method, endpoint = %self.endpoint, encapsulated = %header.encapsulated(), "send icap request");

        match body {
            Some(body) => {
                framed_write.feed(Message::<_, Bytes>::Header(header)).await?;
                if !body.is_empty() {
                    framed_write.feed(Message::<RequestHeader, _>::Payload(PayloadItem::Chunk(body))).await?;
                }
                let end = match &state {
                    Some(state) if state.body_fitted_in_preview() => PayloadItem::Ieof,
                    _ => PayloadItem::Eof,
                };
                framed_write.send(Message::<RequestHeader, Bytes>::Payload(end)).await?;
            }
            None => framed_write.send(Message::<_, Bytes>::Header(header)).await?,
        }

        let mut response = read_response(&mut framed_read).await?;

        if let Some(state) = &mut state {
            let continuation = state.on_response(response.status()).map_err(ClientError::unexpected_response)?;
            if let Some(rest) = continuation {
                debug!(remaining = rest.len(), "send continuation after preview");
                framed_write.encoder_mut().continue_payload();
                if !rest.is_empty() {
                    framed_write.feed(Message::<RequestHeader, _>::Payload(PayloadItem::Chunk(rest))).await?;
                }
                framed_write.send(Message::<RequestHeader, Bytes>::Payload(PayloadItem::Eof)).await?;
                state.continuation_sent();

                response = read_response(&mut framed_read).await?;
            }
        }

        ensure!(response.status() != IcapStatus::CONTINUE, ClientError::unexpected_response("100 Continue without a preview"));
        Ok(response)
    }
}

async fn read_response<R>(framed_read: &mut FramedRead<R, ResponseDecoder>) -> Result<IcapResponse, ClientError>
where
    R: AsyncRead + Unpin,
{
    let head = match framed_read.next().await {
        Some(Ok(Message::Header(head))) => head,
        Some(Ok(Message::Payload(_))) => return Err(ClientError::unexpected_response("body without response head")),
        Some(Err(e)) => return Err(e.into()),
        None => return Err(ClientError::ConnectionClosed),
    };

    let mut body = BytesMut::new();
    loop {
        match framed_read.next().await {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => body.extend_from_slice(&bytes),
            Some(Ok(Message::Payload(_))) => break,
            Some(Ok(Message::Header(_))) => return Err(ClientError::unexpected_response("response head inside body")),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ClientError::ConnectionClosed),
        }
    }

    let body = head.has_body().then(|| body.freeze());
    Ok(IcapResponse::from_parts(head, body))
}
