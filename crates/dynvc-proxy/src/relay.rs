use std::collections::BTreeMap;

use dynvc::{DvcError, DvcErrorExt as _, DvcResult};
use dynvc_core::{decode, DecodeErrorKind};
use dynvc_pdu::{ChannelId, ClientPdu, DataFirstPdu, DataPdu, DvcDataPdu, ServerPdu};

use crate::intercept::{Direction, DvcInterceptor, InterceptResult, InterceptionEntry};

struct ProxyChannel {
    name: String,
    intercepted: bool,
    /// Active multi-fragment drop, if any.
    skip: Option<InterceptionEntry>,
    /// Bytes still expected for a fragmented message that is being passed
    /// through; used to tell continuation fragments from first ones.
    passthrough_remaining: usize,
}

/// Per-connection bidirectional DVC filter.
///
/// Feed every DRDYNVC frame through [`process`](Self::process) with its
/// direction; the returned frames are what must be forwarded to the other
/// side. Control traffic (CREATE, CLOSE, CAPABILITIES, SOFT_SYNC) passes
/// through unchanged and is used to learn channel names; data traffic on
/// intercepted channels is subject to the interceptor's verdict.
pub struct ProxyRelay {
    interceptor: Box<dyn DvcInterceptor>,
    channels: BTreeMap<ChannelId, ProxyChannel>,
}

impl ProxyRelay {
    pub fn new(interceptor: Box<dyn DvcInterceptor>) -> Self {
        Self {
            interceptor,
            channels: BTreeMap::new(),
        }
    }

    /// The drop bookkeeping for a channel, when a message is being skipped.
    pub fn skip_state(&self, id: ChannelId) -> Option<&InterceptionEntry> {
        self.channels.get(&id).and_then(|channel| channel.skip.as_ref())
    }

    /// Whether the named channel would be intercepted.
    pub fn intercepts(&self, name: &str) -> bool {
        self.interceptor.dyn_channel_to_intercept(name)
    }

    /// Processes one frame travelling in `direction`; returns the frames to
    /// forward to the peer.
    pub fn process(&mut self, direction: Direction, frame: &[u8]) -> DvcResult<Vec<Vec<u8>>> {
        let data_pdu = match direction {
            Direction::ServerToClient => match decode::<ServerPdu<'_>>(frame) {
                Ok(ServerPdu::Data(data)) => data,
                Ok(ServerPdu::CreateRequest(create)) => {
                    let intercepted = self.interceptor.dyn_channel_to_intercept(&create.channel_name);
                    debug!(
                        channel_id = create.channel_id,
                        channel_name = %create.channel_name,
                        intercepted,
                        "Proxy observed channel creation"
                    );
                    self.channels.insert(
                        create.channel_id,
                        ProxyChannel {
                            name: create.channel_name,
                            intercepted,
                            skip: None,
                            passthrough_remaining: 0,
                        },
                    );
                    return Ok(vec![frame.to_vec()]);
                }
                Ok(ServerPdu::Close(close)) => {
                    self.channels.remove(&close.channel_id);
                    return Ok(vec![frame.to_vec()]);
                }
                Ok(_) => return Ok(vec![frame.to_vec()]),
                Err(error) => return Self::forward_undecodable(frame, &error),
            },
            Direction::ClientToServer => match decode::<ClientPdu<'_>>(frame) {
                Ok(ClientPdu::Data(data)) => data,
                Ok(ClientPdu::CreateResponse(response)) => {
                    if !response.creation_status.is_ok() {
                        self.channels.remove(&response.channel_id);
                    }
                    return Ok(vec![frame.to_vec()]);
                }
                Ok(ClientPdu::Close(close)) => {
                    self.channels.remove(&close.channel_id);
                    return Ok(vec![frame.to_vec()]);
                }
                Ok(_) => return Ok(vec![frame.to_vec()]),
                Err(error) => return Self::forward_undecodable(frame, &error),
            },
        };

        self.process_data(direction, frame, &data_pdu)
    }

    /// Unknown commands pass through raw (the proxy is best-effort for
    /// traffic it does not understand); malformed frames are fatal.
    fn forward_undecodable(frame: &[u8], error: &dynvc_core::DecodeError) -> DvcResult<Vec<Vec<u8>>> {
        match error.kind() {
            DecodeErrorKind::UnexpectedMessageType { got } => {
                warn!(cmd = got, "Forwarding frame with unknown DVC command unmodified");
                Ok(vec![frame.to_vec()])
            }
            DecodeErrorKind::NotEnoughBytes { .. } => Err(DvcError::truncated("ProxyRelay::process")),
            _ => Err(DvcError::reserved_field("ProxyRelay::process")),
        }
    }

    fn process_data(
        &mut self,
        direction: Direction,
        frame: &[u8],
        pdu: &DvcDataPdu<'_>,
    ) -> DvcResult<Vec<Vec<u8>>> {
        let id = pdu.channel_id();
        let Some(channel) = self.channels.get_mut(&id) else {
            trace!(channel_id = id, "Data for channel the proxy never saw; forwarding");
            return Ok(vec![frame.to_vec()]);
        };

        if !channel.intercepted {
            return Ok(vec![frame.to_vec()]);
        }

        match pdu {
            DvcDataPdu::DataFirst(first) => {
                // A new message interrupts any skip in progress.
                channel.skip = None;
                channel.passthrough_remaining = 0;
                Self::apply_verdict(&mut self.interceptor, channel, direction, id, first.data, true, |data| {
                    let chunk = first.data.len();
                    let new_total = (first.total_length as usize)
                        .saturating_sub(chunk)
                        .saturating_add(data.len());
                    encode_data_pdu(
                        direction,
                        DvcDataPdu::DataFirst(DataFirstPdu::new(id, new_total as u32, data)),
                    )
                }, first.total_length as usize, frame)
            }
            DvcDataPdu::Data(data) => {
                if let Some(skip) = &mut channel.skip {
                    let done = skip.consume(data.data.len());
                    trace!(channel_id = id, skipped = skip.skipped, total = skip.total, "Skipping fragment");
                    if done {
                        channel.skip = None;
                    }
                    return Ok(Vec::new());
                }

                let is_first = channel.passthrough_remaining == 0;
                if !is_first {
                    channel.passthrough_remaining = channel.passthrough_remaining.saturating_sub(data.data.len());
                }

                Self::apply_verdict(&mut self.interceptor, channel, direction, id, data.data, is_first, |payload| {
                    encode_data_pdu(direction, DvcDataPdu::Data(DataPdu::new(id, payload)))
                }, data.data.len(), frame)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_verdict(
        interceptor: &mut Box<dyn DvcInterceptor>,
        channel: &mut ProxyChannel,
        direction: Direction,
        id: ChannelId,
        payload: &[u8],
        is_first: bool,
        reframe: impl Fn(&[u8]) -> DvcResult<Vec<u8>>,
        announced_total: usize,
        frame: &[u8],
    ) -> DvcResult<Vec<Vec<u8>>> {
        match interceptor.dyn_channel_intercept(direction, &channel.name, payload, is_first) {
            InterceptResult::Pass => {
                if is_first && announced_total > payload.len() {
                    channel.passthrough_remaining = announced_total - payload.len();
                }
                Ok(vec![frame.to_vec()])
            }
            InterceptResult::Drop => {
                if is_first && announced_total > payload.len() {
                    debug!(channel_id = id, total = announced_total, "Dropping fragmented message");
                    channel.skip = Some(InterceptionEntry::new(id, announced_total, payload.len()));
                } else if !is_first {
                    warn!(channel_id = id, "Dropping a continuation fragment; peer reassembly will stall");
                }
                Ok(Vec::new())
            }
            InterceptResult::Rewrite(new_payload) => {
                if is_first && announced_total > payload.len() {
                    channel.passthrough_remaining = announced_total - payload.len();
                }
                Ok(vec![reframe(&new_payload)?])
            }
        }
    }
}

fn encode_data_pdu(direction: Direction, pdu: DvcDataPdu<'_>) -> DvcResult<Vec<u8>> {
    let encoded = match direction {
        Direction::ServerToClient => dynvc_core::encode_vec(&ServerPdu::Data(pdu)),
        Direction::ClientToServer => dynvc_core::encode_vec(&ClientPdu::Data(pdu)),
    };
    encoded.map_err(DvcError::encode)
}
