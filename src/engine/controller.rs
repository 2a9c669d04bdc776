//! Controller contract.

use async_trait::async_trait;

use crate::engine::context::ActionContext;
use crate::error::EngineError;
use crate::http::response::ActionResult;
use crate::routing::RouteValues;

/// A named group of actions and the routes that reach them.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Name used by routes (`<controller>:<action>`).
    fn name(&self) -> &str;

    /// Values applied to every route of this controller.
    fn defaults(&self) -> RouteValues {
        RouteValues::default()
    }

    /// Route declarations of this controller.
    fn routes(&self) -> Vec<RouteValues>;

    /// Run `action`. Unknown actions answer [`EngineError::UnknownAction`].
    async fn invoke(
        &self,
        action: &str,
        ctx: &mut ActionContext,
    ) -> Result<ActionResult, EngineError>;
}
