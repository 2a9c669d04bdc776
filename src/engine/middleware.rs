//! Route middlewares.
//!
//! Middlewares are registered by name on the application and listed by
//! name on routes. They run in declaration order around the action; each
//! one decides whether to call [`Next::run`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::context::ActionContext;
use crate::engine::controller::Controller;
use crate::error::EngineError;
use crate::http::response::ActionResult;

/// Code wrapped around an action.
#[async_trait]
pub trait RouteMiddleware: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut ActionContext,
        next: Next<'_>,
    ) -> Result<ActionResult, EngineError>;
}

/// The rest of the chain: remaining middlewares, then the action.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn RouteMiddleware>],
    controller: &'a dyn Controller,
    action: &'a str,
}

impl<'a> Next<'a> {
    pub fn new(
        middlewares: &'a [Arc<dyn RouteMiddleware>],
        controller: &'a dyn Controller,
        action: &'a str,
    ) -> Self {
        Self {
            middlewares,
            controller,
            action,
        }
    }

    pub async fn run(self, ctx: &mut ActionContext) -> Result<ActionResult, EngineError> {
        match self.middlewares.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    middlewares: rest,
                    controller: self.controller,
                    action: self.action,
                };
                first.handle(ctx, next).await
            }
            None => self.controller.invoke(self.action, ctx).await,
        }
    }
}
