use super::{ContextId, Request, Response, TransportError};

/// A trait that provides the interface to the direct ethernet service.
///
/// A transport is shared by every call running on a board group, so all methods take `&self`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Opens a new context.
    async fn new_context(&self) -> Result<ContextId, TransportError>;

    /// Executes `request` in the context `ctx`.
    async fn send(&self, ctx: ContextId, request: Request) -> Result<Response, TransportError>;

    /// Closes the context `ctx`.
    async fn expire_context(&self, ctx: ContextId) -> Result<(), TransportError>;
}

#[async_trait::async_trait]
impl Transport for Box<dyn Transport> {
    async fn new_context(&self) -> Result<ContextId, TransportError> {
        self.as_ref().new_context().await
    }

    async fn send(&self, ctx: ContextId, request: Request) -> Result<Response, TransportError> {
        self.as_ref().send(ctx, request).await
    }

    async fn expire_context(&self, ctx: ContextId) -> Result<(), TransportError> {
        self.as_ref().expire_context(ctx).await
    }
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn new_context(&self) -> Result<ContextId, TransportError> {
        self.as_ref().new_context().await
    }

    async fn send(&self, ctx: ContextId, request: Request) -> Result<Response, TransportError> {
        self.as_ref().send(ctx, request).await
    }

    async fn expire_context(&self, ctx: ContextId) -> Result<(), TransportError> {
        self.as_ref().expire_context(ctx).await
    }
}
