//! Capability catalog: which (entity, action) pairs each RPC method needs.
//!
//! Entries mirror the macaroon permissions lnd attaches to its unary
//! Lightning methods. Keys are slash-form URIs, the canonical form used for
//! lookups after the dotted caller form is rewritten.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One required capability for a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredOp {
    pub entity: &'static str,
    pub action: &'static str,
}

macro_rules! op {
    ($entity:literal, $action:literal) => {
        RequiredOp {
            entity: $entity,
            action: $action,
        }
    };
}

static CATALOG: Lazy<HashMap<&'static str, Vec<RequiredOp>>> = Lazy::new(|| {
    HashMap::from([
        ("/lnrpc.Lightning/GetInfo", vec![op!("info", "read")]),
        ("/lnrpc.Lightning/WalletBalance", vec![op!("onchain", "read")]),
        ("/lnrpc.Lightning/ChannelBalance", vec![op!("offchain", "read")]),
        ("/lnrpc.Lightning/GetTransactions", vec![op!("onchain", "read")]),
        ("/lnrpc.Lightning/ListChannels", vec![op!("offchain", "read")]),
        ("/lnrpc.Lightning/PendingChannels", vec![op!("offchain", "read")]),
        ("/lnrpc.Lightning/ClosedChannels", vec![op!("offchain", "read")]),
        ("/lnrpc.Lightning/ListPayments", vec![op!("offchain", "read")]),
        ("/lnrpc.Lightning/ListInvoices", vec![op!("invoices", "read")]),
        ("/lnrpc.Lightning/LookupInvoice", vec![op!("invoices", "read")]),
        ("/lnrpc.Lightning/AddInvoice", vec![op!("invoices", "write")]),
        ("/lnrpc.Lightning/DecodePayReq", vec![op!("offchain", "read")]),
        (
            "/lnrpc.Lightning/SendPaymentSync",
            vec![op!("offchain", "write")],
        ),
        ("/lnrpc.Lightning/SendPayment", vec![op!("offchain", "write")]),
        ("/lnrpc.Lightning/SendCoins", vec![op!("onchain", "write")]),
        ("/lnrpc.Lightning/NewAddress", vec![op!("address", "write")]),
        ("/lnrpc.Lightning/ConnectPeer", vec![op!("peers", "write")]),
        ("/lnrpc.Lightning/DisconnectPeer", vec![op!("peers", "write")]),
        ("/lnrpc.Lightning/ListPeers", vec![op!("peers", "read")]),
        (
            "/lnrpc.Lightning/OpenChannelSync",
            vec![op!("onchain", "write"), op!("offchain", "write")],
        ),
        (
            "/lnrpc.Lightning/CloseChannel",
            vec![op!("onchain", "write"), op!("offchain", "write")],
        ),
        ("/lnrpc.Lightning/DescribeGraph", vec![op!("info", "read")]),
        ("/lnrpc.Lightning/GetChanInfo", vec![op!("info", "read")]),
        ("/lnrpc.Lightning/GetNodeInfo", vec![op!("info", "read")]),
        ("/lnrpc.Lightning/QueryRoutes", vec![op!("info", "read")]),
        ("/lnrpc.Lightning/FeeReport", vec![op!("offchain", "read")]),
        (
            "/lnrpc.Lightning/UpdateChannelPolicy",
            vec![op!("offchain", "write")],
        ),
    ])
});

/// Required capabilities for a slash-form URI. `None` means the method is
/// unknown to the catalog (callers treat that as deny, not as an error).
pub fn required_for(uri: &str) -> Option<&'static [RequiredOp]> {
    CATALOG.get(uri).map(|v| v.as_slice())
}

/// All slash-form URIs the catalog knows. The codec registers dispatchers
/// for exactly this set.
pub fn uris() -> impl Iterator<Item = &'static str> {
    CATALOG.keys().copied()
}
