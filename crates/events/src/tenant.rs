use bizdesk_core::TenantId;

use crate::EventEnvelope;

/// Messages that may belong to a tenant.
///
/// `None` marks platform-wide messages (e.g. the system role being re-linked);
/// tenant-pinned workers treat those as relevant to every tenant.
pub trait TenantScoped {
    fn tenant_id(&self) -> Option<TenantId>;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id()
    }
}
