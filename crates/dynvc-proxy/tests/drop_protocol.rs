use dynvc_core::encode_vec;
use dynvc_pdu::{CreateRequestPdu, DataFirstPdu, DataPdu, DvcDataPdu, ServerPdu};
use dynvc_proxy::{Direction, DvcInterceptor, InterceptResult, ProxyRelay};

const CHANNEL_ID: u32 = 11;

struct DropFirstMessage {
    verdicts: Vec<(bool, usize)>,
}

impl DvcInterceptor for DropFirstMessage {
    fn dyn_channel_to_intercept(&self, name: &str) -> bool {
        name == "FILTERED"
    }

    fn dyn_channel_intercept(
        &mut self,
        _direction: Direction,
        _name: &str,
        data: &[u8],
        is_first: bool,
    ) -> InterceptResult {
        self.verdicts.push((is_first, data.len()));
        if is_first {
            InterceptResult::Drop
        } else {
            InterceptResult::Pass
        }
    }
}

fn frame(pdu: ServerPdu<'_>) -> Vec<u8> {
    encode_vec(&pdu).unwrap()
}

// A 512-byte message in four 128-byte fragments is dropped whole: nothing is
// forwarded, every fragment is consumed, and the channel keeps working.
#[test]
fn multi_fragment_message_is_dropped_whole() {
    let mut relay = ProxyRelay::new(Box::new(DropFirstMessage { verdicts: Vec::new() }));

    let create = frame(ServerPdu::CreateRequest(CreateRequestPdu::new(
        CHANNEL_ID,
        String::from("FILTERED"),
    )));
    let forwarded = relay.process(Direction::ServerToClient, &create).unwrap();
    assert_eq!(forwarded, vec![create]);

    let payload = [0x5A_u8; 128];

    let first = frame(ServerPdu::Data(DvcDataPdu::DataFirst(DataFirstPdu::new(
        CHANNEL_ID, 512, &payload,
    ))));
    assert!(relay.process(Direction::ServerToClient, &first).unwrap().is_empty());

    let skip = relay.skip_state(CHANNEL_ID).expect("skip entry recorded");
    assert_eq!(skip.total, 512);
    assert_eq!(skip.skipped, 128);

    for expected_skipped in [256, 384] {
        let data = frame(ServerPdu::Data(DvcDataPdu::Data(DataPdu::new(CHANNEL_ID, &payload))));
        assert!(relay.process(Direction::ServerToClient, &data).unwrap().is_empty());
        assert_eq!(relay.skip_state(CHANNEL_ID).unwrap().skipped, expected_skipped);
    }

    let last = frame(ServerPdu::Data(DvcDataPdu::Data(DataPdu::new(CHANNEL_ID, &payload))));
    assert!(relay.process(Direction::ServerToClient, &last).unwrap().is_empty());
    assert!(relay.skip_state(CHANNEL_ID).is_none());

    // Later traffic on the channel reaches the hook again as a fresh first
    // fragment; this interceptor drops those too.
    let single = frame(ServerPdu::Data(DvcDataPdu::Data(DataPdu::new(CHANNEL_ID, &[1, 2, 3]))));
    assert!(relay.process(Direction::ServerToClient, &single).unwrap().is_empty());
}

#[test]
fn rewrite_replaces_payload_and_adjusts_header() {
    struct RewriteFirst;

    impl DvcInterceptor for RewriteFirst {
        fn dyn_channel_to_intercept(&self, name: &str) -> bool {
            name == "FILTERED"
        }

        fn dyn_channel_intercept(
            &mut self,
            _direction: Direction,
            _name: &str,
            _data: &[u8],
            is_first: bool,
        ) -> InterceptResult {
            if is_first {
                InterceptResult::Rewrite(vec![0xEE; 16])
            } else {
                InterceptResult::Pass
            }
        }
    }

    let mut relay = ProxyRelay::new(Box::new(RewriteFirst));

    let create = frame(ServerPdu::CreateRequest(CreateRequestPdu::new(
        CHANNEL_ID,
        String::from("FILTERED"),
    )));
    relay.process(Direction::ServerToClient, &create).unwrap();

    let chunk = [0x5A_u8; 128];
    let first = frame(ServerPdu::Data(DvcDataPdu::DataFirst(DataFirstPdu::new(
        CHANNEL_ID, 256, &chunk,
    ))));
    let forwarded = relay.process(Direction::ServerToClient, &first).unwrap();
    assert_eq!(forwarded.len(), 1);

    match dynvc_core::decode::<ServerPdu<'_>>(&forwarded[0]).unwrap() {
        ServerPdu::Data(DvcDataPdu::DataFirst(rewritten)) => {
            // 256 original = 128 now + 128 still to come; the rewritten
            // first fragment is 16 bytes, so the new total is 16 + 128.
            assert_eq!(rewritten.total_length, 144);
            assert_eq!(rewritten.data, [0xEE; 16]);
        }
        other => panic!("unexpected PDU {other:?}"),
    }

    // The continuation fragment passes through untouched.
    let data = frame(ServerPdu::Data(DvcDataPdu::Data(DataPdu::new(CHANNEL_ID, &chunk))));
    let forwarded = relay.process(Direction::ServerToClient, &data).unwrap();
    assert_eq!(forwarded, vec![data]);
}
