//! The RIB daemon (§4.6): local create/delete/read/write/start/stop
//! verbs, their remote twins built over the CDAP session layer, and the
//! invoke-id-keyed response-handler table that demultiplexes replies.
//!
//! Grounded on `original_source/librina/include/librina/rib.h`'s
//! `RIBDaemon`/`IRIBDaemon`, collapsed from the original's
//! `sendMessageToProcess`/`getCDAPMessageHandler`/
//! `processIncomingRequestMessage`/`processIncomingResponseMessage` quartet
//! into [`RibDaemon::send_request`] and [`RibDaemon::message_delivered`] —
//! the original's split exists to share code between its `useAddress` and
//! `port_id`-direct send paths, a distinction this crate's [`RemoteTransport`]
//! already erases by taking a port-id alone (address-to-port-id resolution
//! is the RMT/flow-allocator's job, out of scope per spec.md §1).
use std::collections::HashMap;
use std::sync::Arc;

use async_std::sync::Mutex;
use async_trait::async_trait;
use dtsv::PortId;
use tracing::{debug, warn};

use crate::error::Result;
use crate::object::parent_name;
use crate::store::Rib;
use cdap::{CdapMessage, CdapSession, Flags, ObjectValue, Opcode};

/// What the daemon calls to hand an encoded CDAP message to the flow bound
/// to a port-id (mirrors `IRIBDaemon::sendMessageSpecific`, address
/// resolution stripped since it is out of scope here).
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Sends `bytes` out over the flow bound to `port_id`.
    async fn send(&self, port_id: PortId, bytes: Vec<u8>) -> Result<()>;
}

/// Invoked when a response to a `remote_*` request this daemon sent
/// arrives (§4.6 "register a response handler keyed by invoke-id").
pub trait ResponseHandler: Send + Sync {
    /// Delivers the decoded response message.
    fn handle(&self, response: &CdapMessage);
}

impl<F: Fn(&CdapMessage) + Send + Sync> ResponseHandler for F {
    fn handle(&self, response: &CdapMessage) {
        (self)(response)
    }
}

struct Inner {
    rib: Rib,
    sessions: HashMap<PortId, CdapSession>,
    handlers: HashMap<u32, Arc<dyn ResponseHandler>>,
}

/// The RIB daemon: owns the object tree, one CDAP session per bound
/// port-id, and the response-handler table (§4.6).
pub struct RibDaemon<T> {
    inner: Mutex<Inner>,
    transport: T,
}

impl<T: RemoteTransport> RibDaemon<T> {
    /// Builds a daemon over `rib`, sending remote verbs through
    /// `transport`.
    pub fn new(rib: Rib, transport: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rib,
                sessions: HashMap::new(),
                handlers: HashMap::new(),
            }),
            transport,
        }
    }

    // ---- local verbs (§4.6) ----

    /// Creates an object of `class` at `name` with `value` in the local
    /// tree.
    pub async fn create_object(&self, class: &str, name: &str, value: Option<ObjectValue>) -> Result<u64> {
        self.inner.lock().await.rib.add_object(class, name, value)
    }

    /// Deletes `name` and its descendants from the local tree, returning
    /// the names actually removed.
    pub async fn delete_object(&self, name: &str) -> Vec<String> {
        self.inner.lock().await.rib.remove_object(name)
    }

    /// Reads `name`'s current value, `class`-checked.
    pub async fn read_object(&self, class: &str, name: &str) -> Option<ObjectValue> {
        self.inner.lock().await.rib.get_by_name(class, name).and_then(|object| object.value.clone())
    }

    /// Overwrites `name`'s value.
    pub async fn write_object(&self, name: &str, value: Option<ObjectValue>) -> Result<()> {
        self.inner.lock().await.rib.write_value(name, value)
    }

    /// `start`/`stop` are writes that additionally signal an
    /// operational-state transition; spec.md gives them no behaviour
    /// beyond the verb name (§4.6), so both share `write_object`'s path.
    pub async fn start_object(&self, name: &str, value: Option<ObjectValue>) -> Result<()> {
        self.write_object(name, value).await
    }

    /// See [`RibDaemon::start_object`].
    pub async fn stop_object(&self, name: &str, value: Option<ObjectValue>) -> Result<()> {
        self.write_object(name, value).await
    }

    // ---- remote verbs ----

    #[allow(clippy::too_many_arguments)]
    async fn send_request(
        &self,
        port_id: PortId,
        opcode: Opcode,
        class: &str,
        name: &str,
        value: Option<ObjectValue>,
        scope: Option<i32>,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Result<()> {
        // §4.6 "send discipline": the lock brackets encode, session-state
        // update, and transport write so a response handler is always
        // registered before the peer could possibly reply.
        let mut inner = self.inner.lock().await;
        let session = inner.sessions.entry(port_id).or_insert_with(|| CdapSession::new(port_id));
        let invoke_id = session.new_invoke_id();
        let mut msg = CdapMessage::new(opcode, invoke_id);
        msg.obj_class = Some(class.to_string());
        msg.obj_name = Some(name.to_string());
        msg.obj_value = value;
        msg.scope = scope;
        let bytes = session.encode_next_message_to_be_sent(&msg)?;
        if let Some(handler) = handler {
            inner.handlers.insert(invoke_id, handler);
        }
        drop(inner);
        self.transport.send(port_id, bytes).await
    }

    /// Invokes a create operation on a remote RIB (§4.6).
    pub async fn remote_create_object(
        &self,
        port_id: PortId,
        class: &str,
        name: &str,
        value: Option<ObjectValue>,
        scope: Option<i32>,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Result<()> {
        self.send_request(port_id, Opcode::Create, class, name, value, scope, handler).await
    }

    /// Invokes a delete operation on a remote RIB.
    pub async fn remote_delete_object(
        &self,
        port_id: PortId,
        class: &str,
        name: &str,
        scope: Option<i32>,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Result<()> {
        self.send_request(port_id, Opcode::Delete, class, name, None, scope, handler).await
    }

    /// Invokes a read operation on a remote RIB.
    pub async fn remote_read_object(
        &self,
        port_id: PortId,
        class: &str,
        name: &str,
        scope: Option<i32>,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Result<()> {
        self.send_request(port_id, Opcode::Read, class, name, None, scope, handler).await
    }

    /// Invokes a write operation on a remote RIB.
    #[allow(clippy::too_many_arguments)]
    pub async fn remote_write_object(
        &self,
        port_id: PortId,
        class: &str,
        name: &str,
        value: Option<ObjectValue>,
        scope: Option<i32>,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Result<()> {
        self.send_request(port_id, Opcode::Write, class, name, value, scope, handler).await
    }

    /// Invokes a start operation on a remote RIB.
    #[allow(clippy::too_many_arguments)]
    pub async fn remote_start_object(
        &self,
        port_id: PortId,
        class: &str,
        name: &str,
        value: Option<ObjectValue>,
        scope: Option<i32>,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Result<()> {
        self.send_request(port_id, Opcode::Start, class, name, value, scope, handler).await
    }

    /// Invokes a stop operation on a remote RIB.
    #[allow(clippy::too_many_arguments)]
    pub async fn remote_stop_object(
        &self,
        port_id: PortId,
        class: &str,
        name: &str,
        value: Option<ObjectValue>,
        scope: Option<i32>,
        handler: Option<Arc<dyn ResponseHandler>>,
    ) -> Result<()> {
        self.send_request(port_id, Opcode::Stop, class, name, value, scope, handler).await
    }

    // ---- inbound dispatch ----

    /// Decodes and dispatches an inbound CDAP message arriving on
    /// `port_id`: requests apply to the local tree with create-or-update
    /// delegation (§4.6), responses are demultiplexed to their registered
    /// handler by invoke-id.
    pub async fn message_delivered(&self, port_id: PortId, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = inner.sessions.entry(port_id).or_insert_with(|| CdapSession::new(port_id));
        let msg = session.message_received(bytes)?;

        if msg.opcode.is_request() {
            let field_sep = inner.rib.field_sep();
            Self::apply_request(&mut inner.rib, &msg, field_sep);
        } else {
            // READ_INCOMPLETE means more fragments of this read are still
            // coming, so the handler stays registered for the next one
            // (§4.6 "unless flags carry READ_INCOMPLETE, in which case
            // leave it registered").
            let keep_registered = msg.flags == Flags::ReadIncomplete;
            let handler = if keep_registered {
                inner.handlers.get(&msg.invoke_id).cloned()
            } else {
                inner.handlers.remove(&msg.invoke_id)
            };
            drop(inner);
            match handler {
                Some(handler) => handler.handle(&msg),
                None => warn!(invoke_id = msg.invoke_id, "response with no registered handler"),
            }
        }
        Ok(())
    }

    /// Applies an inbound request to the tree (§4.6 "create-or-update").
    fn apply_request(rib: &mut Rib, msg: &CdapMessage, field_sep: char) {
        let (class, name) = match (&msg.obj_class, &msg.obj_name) {
            (Some(class), Some(name)) => (class.clone(), name.clone()),
            _ => return,
        };
        match msg.opcode {
            Opcode::Create => {
                if rib.add_object(&class, &name, msg.obj_value.clone()).is_err() {
                    // "if absent, walk up to the nearest ancestor that
                    // exists and delegate the create" (§4.6). This layer
                    // has no per-class `remoteCreateObject` override to
                    // invoke, so the ancestor's value is overwritten as
                    // the stand-in delegation target.
                    let mut ancestor = parent_name(&name, field_sep);
                    while let Some(candidate) = ancestor {
                        if rib.get_any_by_name(&candidate).is_some() {
                            let _ = rib.write_value(&candidate, msg.obj_value.clone());
                            return;
                        }
                        ancestor = parent_name(&candidate, field_sep);
                    }
                    debug!(name = name.as_str(), "create delegated with no existing ancestor");
                }
            }
            Opcode::Delete => {
                rib.remove_object(&name);
            }
            Opcode::Write | Opcode::Start | Opcode::Stop => {
                let _ = rib.write_value(&name, msg.obj_value.clone());
            }
            Opcode::Read | Opcode::CancelRead => {
                // Read-side verbs do not mutate the tree at this layer;
                // a real responder would encode the current value into a
                // `*_R` reply, which is the caller's job once this call
                // returns control.
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RibSchema, ROOT_CLASS};
    use async_std::sync::Mutex as AsyncMutex;
    use async_std::task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        sent: AsyncMutex<Vec<(PortId, Vec<u8>)>>,
    }

    #[async_trait]
    impl RemoteTransport for RecordingTransport {
        async fn send(&self, port_id: PortId, bytes: Vec<u8>) -> Result<()> {
            self.sent.lock().await.push((port_id, bytes));
            Ok(())
        }
    }

    fn schema() -> RibSchema {
        let mut schema = RibSchema::new();
        schema.def_cont_relation(ROOT_CLASS, "A", "A", true, None);
        schema
    }

    #[test]
    fn local_create_then_read_round_trips_the_value() {
        task::block_on(async {
            let daemon = RibDaemon::new(Rib::new(schema()), RecordingTransport::default());
            daemon.create_object("A", "A=1", Some(ObjectValue::Int32(7))).await.unwrap();
            let value = daemon.read_object("A", "A=1").await;
            assert_eq!(value, Some(ObjectValue::Int32(7)));
        });
    }

    #[test]
    fn remote_create_registers_a_handler_before_sending() {
        task::block_on(async {
            let daemon = RibDaemon::new(Rib::new(schema()), RecordingTransport::default());
            let calls = Arc::new(AtomicUsize::new(0));
            let calls_clone = calls.clone();
            let handler: Arc<dyn ResponseHandler> = Arc::new(move |_msg: &CdapMessage| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            });
            daemon
                .remote_create_object(PortId(1), "A", "A=1", Some(ObjectValue::Bool(true)), None, Some(handler))
                .await
                .unwrap();
            assert_eq!(daemon.inner.lock().await.handlers.len(), 1);
            assert_eq!(daemon.transport.sent.lock().await.len(), 1);
        });
    }

    #[test]
    fn response_without_read_incomplete_frees_the_handler() {
        task::block_on(async {
            let daemon = RibDaemon::new(Rib::new(schema()), RecordingTransport::default());
            let calls = Arc::new(AtomicUsize::new(0));
            let calls_clone = calls.clone();
            let handler: Arc<dyn ResponseHandler> = Arc::new(move |_msg: &CdapMessage| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            });
            daemon
                .remote_read_object(PortId(1), "A", "A=1", None, Some(handler))
                .await
                .unwrap();

            let invoke_id = {
                let inner = daemon.inner.lock().await;
                *inner.handlers.keys().next().unwrap()
            };
            let mut response = CdapMessage::new(Opcode::ReadR, invoke_id);
            response.result = Some(0);
            let bytes = cdap::codec::encode(&response);
            daemon.message_delivered(PortId(1), &bytes).await.unwrap();

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert!(daemon.inner.lock().await.handlers.is_empty());
        });
    }

    /// A create request for a name whose exact object is absent, but
    /// whose parent exists, is delegated to the parent (§4.6
    /// "create-or-update").
    #[test]
    fn inbound_create_with_existing_parent_delegates_to_it() {
        task::block_on(async {
            let mut schema = schema();
            schema.def_cont_relation("A", "B", "B", true, None);
            let daemon = RibDaemon::new(Rib::new(schema), RecordingTransport::default());
            daemon.create_object("A", "A=1", None).await.unwrap();

            let mut create = CdapMessage::new(Opcode::Create, 1);
            create.obj_class = Some("B".to_string());
            create.obj_name = Some("A=1,B=9".to_string());
            create.obj_value = Some(ObjectValue::Int32(42));
            let bytes = cdap::codec::encode(&create);
            daemon.message_delivered(PortId(2), &bytes).await.unwrap();

            // The target object itself was never created...
            assert_eq!(daemon.read_object("B", "A=1,B=9").await, None);
            // ...but the existing parent absorbed the delegated value.
            assert_eq!(daemon.read_object("A", "A=1").await, Some(ObjectValue::Int32(42)));
        });
    }
}
