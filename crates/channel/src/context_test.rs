use serde_json::json;

use crate::{MessageContext, Scope, VariableStore};

#[test]
fn message_scope_is_private_to_one_traversal() {
    let store = VariableStore::new();
    let a = MessageContext::new(&store, "chan", "msg-1");
    let b = MessageContext::new(&store, "chan", "msg-2");

    a.set(Scope::Message, "mrn", json!("12345"));
    assert_eq!(a.get(Scope::Message, "mrn"), Some(json!("12345")));
    assert_eq!(b.get(Scope::Message, "mrn"), None);
}

#[test]
fn channel_scope_survives_across_messages() {
    let store = VariableStore::new();
    let first = MessageContext::new(&store, "chan", "msg-1");
    first.set(Scope::Channel, "last_seen", json!("msg-1"));
    drop(first);

    let second = MessageContext::new(&store, "chan", "msg-2");
    assert_eq!(second.get(Scope::Channel, "last_seen"), Some(json!("msg-1")));

    // A different channel sees nothing.
    let other = MessageContext::new(&store, "other", "msg-3");
    assert_eq!(other.get(Scope::Channel, "last_seen"), None);
}

#[test]
fn global_scope_crosses_channels() {
    let store = VariableStore::new();
    let a = MessageContext::new(&store, "chan-a", "msg-1");
    let b = MessageContext::new(&store, "chan-b", "msg-2");

    a.set(Scope::Global, "site", json!("north"));
    assert_eq!(b.get(Scope::Global, "site"), Some(json!("north")));
}

#[test]
fn route_scope_is_fresh_per_traversal() {
    let store = VariableStore::new();
    let context = MessageContext::new(&store, "chan", "msg-1");

    let first = context.with_route("route-1");
    first.set(Scope::Route, "attempt", json!(1));
    assert_eq!(first.get(Scope::Route, "attempt"), Some(json!(1)));

    // Another traversal of the same route starts empty.
    let second = context.with_route("route-1");
    assert_eq!(second.get(Scope::Route, "attempt"), None);
}

#[test]
fn route_scope_requires_a_route() {
    let store = VariableStore::new();
    let context = MessageContext::new(&store, "chan", "msg-1");

    context.set(Scope::Route, "ignored", json!(true));
    assert_eq!(context.get(Scope::Route, "ignored"), None);
    assert_eq!(context.route_id(), None);
}

#[test]
fn route_view_shares_the_other_scopes() {
    let store = VariableStore::new();
    let context = MessageContext::new(&store, "chan", "msg-1");
    context.set(Scope::Message, "flag", json!(true));

    let routed = context.with_route("route-1");
    assert_eq!(routed.get(Scope::Message, "flag"), Some(json!(true)));
    assert_eq!(routed.route_id(), Some("route-1"));
    assert_eq!(routed.message_id(), "msg-1");
    assert_eq!(routed.channel_id(), "chan");

    routed.set(Scope::Channel, "touched", json!(1));
    assert_eq!(context.get(Scope::Channel, "touched"), Some(json!(1)));
}
