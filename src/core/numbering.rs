//! Next-number derivation.
//!
//! The Authority's last authorized number is re-read before every submission and no
//! local counter is kept. That costs one round trip per invoice, but a timed-out
//! submission that silently consumed a number can never cause a duplicate: the next
//! attempt always starts from what the Authority has actually recorded.

use crate::domain::model::InvoiceType;
use crate::domain::ports::FiscalGateway;
use crate::domain::wire::WsfeAuth;
use crate::utils::error::{InvoicingError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Largest number the Authority accepts for a single sale point and type.
pub const MAX_INVOICE_NUMBER: u64 = 99_999_999;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SequenceKey {
    tenant_id: String,
    invoice_type: InvoiceType,
    sale_point: u32,
}

/// A number derived from a fresh query, valid while the guard is held.
///
/// Holding the reservation serializes submissions for the same sequence inside
/// this process; other processes are covered by the Authority's own check
/// (error 10016) and a fresh query on retry.
pub struct NumberReservation {
    pub number: u64,
    pub last_authorized: u64,
    _guard: OwnedMutexGuard<()>,
}

pub struct NumberingCoordinator<G: FiscalGateway> {
    gateway: Arc<G>,
    sequences: Mutex<HashMap<SequenceKey, Arc<Mutex<()>>>>,
}

impl<G: FiscalGateway> NumberingCoordinator<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Locks the (tenant, type, point) sequence, then asks the Authority for its last number.
    pub async fn reserve(
        &self,
        tenant_id: &str,
        auth: &WsfeAuth,
        invoice_type: InvoiceType,
        sale_point: u32,
    ) -> Result<NumberReservation> {
        let lock = {
            let mut sequences = self.sequences.lock().await;
            sequences
                .entry(SequenceKey {
                    tenant_id: tenant_id.to_string(),
                    invoice_type,
                    sale_point,
                })
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;

        let last = self
            .gateway
            .last_authorized_number(auth, invoice_type, sale_point)
            .await?;
        let number = next_number(last)?;

        tracing::debug!(
            tenant = tenant_id,
            invoice_type = invoice_type.code(),
            sale_point,
            last,
            next = number,
            "Number reserved"
        );
        Ok(NumberReservation {
            number,
            last_authorized: last,
            _guard: guard,
        })
    }
}

pub fn next_number(last: u64) -> Result<u64> {
    let next = last + 1;
    if next > MAX_INVOICE_NUMBER {
        return Err(InvoicingError::validation(
            "invoice_number",
            format!("sequence exhausted: last authorized number is {}", last),
        ));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::wire::{InvoiceRecord, InvoiceRequest, InvoiceResponse, SalePointInfo, ServerStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Advances its own counter every time it is asked, like a server other clients also write to.
    struct MovingGateway {
        last: AtomicU64,
        queries: AtomicU64,
    }

    #[async_trait]
    impl FiscalGateway for MovingGateway {
        async fn server_status(&self) -> ServerStatus {
            ServerStatus::unavailable()
        }

        async fn last_authorized_number(&self, _: &WsfeAuth, _: InvoiceType, _: u32) -> Result<u64> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.last.fetch_add(5, Ordering::SeqCst))
        }

        async fn authorize(&self, _: &WsfeAuth, _: &InvoiceRequest) -> Result<InvoiceResponse> {
            unreachable!()
        }

        async fn query_invoice(&self, _: &WsfeAuth, _: InvoiceType, _: u32, _: u64) -> Result<Option<InvoiceRecord>> {
            Ok(None)
        }

        async fn sale_points(&self, _: &WsfeAuth) -> Result<Vec<SalePointInfo>> {
            Ok(vec![])
        }
    }

    fn auth() -> WsfeAuth {
        WsfeAuth {
            token: "t".to_string(),
            sign: "s".to_string(),
            cuit: 20409378472,
        }
    }

    #[tokio::test]
    async fn test_every_reservation_queries_the_authority() {
        let gateway = Arc::new(MovingGateway {
            last: AtomicU64::new(100),
            queries: AtomicU64::new(0),
        });
        let coordinator = NumberingCoordinator::new(gateway.clone());

        let first = coordinator.reserve("t1", &auth(), InvoiceType::InvoiceB, 1).await.unwrap();
        assert_eq!(first.number, 101);
        drop(first);

        let second = coordinator.reserve("t1", &auth(), InvoiceType::InvoiceB, 1).await.unwrap();
        assert_eq!(second.number, 106);
        assert_eq!(second.last_authorized, 105);
        assert_eq!(gateway.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reservation_serializes_same_sequence() {
        let gateway = Arc::new(MovingGateway {
            last: AtomicU64::new(0),
            queries: AtomicU64::new(0),
        });
        let coordinator = Arc::new(NumberingCoordinator::new(gateway));

        let held = coordinator.reserve("t1", &auth(), InvoiceType::InvoiceB, 1).await.unwrap();

        let other = coordinator.clone();
        let waiting = tokio::spawn(async move {
            other.reserve("t1", &auth(), InvoiceType::InvoiceB, 1).await.map(|r| r.number)
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        // A different sale point is independent.
        let independent = coordinator.reserve("t1", &auth(), InvoiceType::InvoiceB, 2).await;
        assert!(independent.is_ok());

        drop(held);
        assert!(waiting.await.unwrap().is_ok());
    }

    #[test]
    fn test_sequence_exhaustion() {
        assert_eq!(next_number(0).unwrap(), 1);
        assert!(next_number(MAX_INVOICE_NUMBER).is_err());
    }
}
