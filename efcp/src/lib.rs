//! # EFCP container
//!
//! Owns the per-process table of EFCP connection instances (§4.1): CEP-id
//! allocation, concurrency-safe lookup and teardown, and the glue that
//! wires a freshly created connection's [`dtp::Dtp`]/[`dtcp::Dtcp`] pair to
//! the RMT collaborator below and the upper-layer collaborator above.
#![deny(missing_docs)]
#![deny(warnings)]
mod cep;
mod container;
mod rmt;
mod upper;

pub use crate::container::EfcpContainer;
pub use crate::rmt::Rmt;
pub use crate::upper::ConnectionUpper;

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::task;
    use dtsv::{Address, DtcpConfig, DtpConfig, PortId, QosId};
    use policy::PolicyParams;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct TestUpper {
        delivered: std::sync::Mutex<Vec<Vec<u8>>>,
        write_enabled: AtomicBool,
        unbound: AtomicUsize,
    }

    impl TestUpper {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: std::sync::Mutex::new(vec![]),
                write_enabled: AtomicBool::new(true),
                unbound: AtomicUsize::new(0),
            })
        }
    }

    impl dtp::Upper for TestUpper {
        fn enable_write(&self) {
            self.write_enabled.store(true, Ordering::SeqCst);
        }

        fn disable_write(&self) {
            self.write_enabled.store(false, Ordering::SeqCst);
        }

        fn sdu_enqueue(&self, sdu: Vec<u8>) {
            self.delivered.lock().unwrap().push(sdu);
        }
    }

    impl ConnectionUpper for TestUpper {
        fn flow_unbinding_ipcp(&self, _port_id: PortId) {
            self.unbound.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn create_loopback_connection(
        container: &Arc<EfcpContainer>,
        upper: Arc<TestUpper>,
        dst_cep: Option<dtsv::CepId>,
        dtcp_cfg: Option<DtcpConfig>,
    ) -> dtsv::CepId {
        container
            .create_connection(
                upper,
                Address(1),
                Address(1),
                PortId(1),
                QosId(0),
                dst_cep,
                1500,
                1500,
                Duration::from_millis(1000),
                DtpConfig {
                    dtcp_present: dtcp_cfg.is_some(),
                    ..DtpConfig::default()
                },
                dtcp_cfg,
                "default",
                &PolicyParams::new(),
            )
            .await
            .unwrap()
    }

    #[test]
    fn create_connection_allocates_increasing_cep_ids() {
        task::block_on(async {
            let container = EfcpContainer::new();
            let a = create_loopback_connection(&container, TestUpper::new(), None, None).await;
            let b = create_loopback_connection(&container, TestUpper::new(), None, None).await;
            assert!(b.0 > a.0);
        });
    }

    /// Two connections sharing one container at the same address (§6.1):
    /// `b`'s outbound PDUs carry `a`'s cep-id as their destination, so the
    /// `RmtChannel` loopback shortcut dispatches them straight into `a`'s
    /// DTP without an `Rmt` ever being bound.
    #[test]
    fn loopback_write_delivers_to_the_peer_connections_upper() {
        task::block_on(async {
            let container = EfcpContainer::new();
            let upper_a = TestUpper::new();
            let cep_a = create_loopback_connection(&container, upper_a.clone(), None, None).await;
            let cep_b = create_loopback_connection(&container, TestUpper::new(), Some(cep_a), None).await;
            container.write(cep_b, b"hello".to_vec()).await.unwrap();
            assert_eq!(&*upper_a.delivered.lock().unwrap(), &[b"hello".to_vec()]);
        });
    }

    #[test]
    fn write_on_unknown_cep_is_invalid_handle() {
        task::block_on(async {
            let container = EfcpContainer::new();
            let err = container.write(dtsv::CepId(999), vec![]).await.unwrap_err();
            assert_eq!(err, dtsv::Error::InvalidHandle);
        });
    }

    #[test]
    fn destroy_connection_is_idempotent() {
        task::block_on(async {
            let container = EfcpContainer::new();
            let cep = create_loopback_connection(&container, TestUpper::new(), None, None).await;
            container.destroy_connection(cep).await.unwrap();
            let err = container.destroy_connection(cep).await.unwrap_err();
            assert_eq!(err, dtsv::Error::InvalidHandle);
        });
    }

    #[test]
    fn destroy_connection_notifies_flow_unbinding() {
        task::block_on(async {
            let container = EfcpContainer::new();
            let upper = TestUpper::new();
            let cep = create_loopback_connection(&container, upper.clone(), None, None).await;
            container.destroy_connection(cep).await.unwrap();
            assert_eq!(upper.unbound.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn write_after_destroy_is_invalid_handle() {
        task::block_on(async {
            let container = EfcpContainer::new();
            let cep = create_loopback_connection(&container, TestUpper::new(), None, None).await;
            container.destroy_connection(cep).await.unwrap();
            let err = container.write(cep, vec![]).await.unwrap_err();
            assert_eq!(err, dtsv::Error::InvalidHandle);
        });
    }

    #[test]
    fn loopback_write_with_dtcp_present_delivers_in_order() {
        task::block_on(async {
            let container = EfcpContainer::new();
            let upper_a = TestUpper::new();
            let cep_a = create_loopback_connection(
                &container,
                upper_a.clone(),
                None,
                Some(DtcpConfig::default()),
            )
            .await;
            let cep_b = create_loopback_connection(
                &container,
                TestUpper::new(),
                Some(cep_a),
                Some(DtcpConfig::default()),
            )
            .await;
            container.write(cep_b, b"a".to_vec()).await.unwrap();
            container.write(cep_b, b"b".to_vec()).await.unwrap();
            assert_eq!(&*upper_a.delivered.lock().unwrap(), &[b"a".to_vec(), b"b".to_vec()]);
        });
    }
}
