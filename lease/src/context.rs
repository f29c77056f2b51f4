use crate::{Error, Result, TenantId};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Context {
    tenant_id: Option<TenantId>,
    token: CancellationToken,
}

impl Context {
    /// A root context: no tenant, never canceled unless `cancel` is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn tenant_id(&self) -> Result<TenantId> {
        self.tenant_id.ok_or(Error::MissingTenant)
    }

    /// Derives a context canceled together with this one, but cancelable on
    /// its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            tenant_id: self.tenant_id,
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this context is canceled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// `Err(Canceled)` if already canceled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
