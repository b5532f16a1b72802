//! 处理器注册表（HandlerRegistry）
//!
//! 启动时按事件种类（`Event::KIND`）显式注册强类型处理器，运行期只读；
//! 查找表即缓存，不做任何基于反射或类型名的匹配。
//!
use crate::handler::{EventHandler, HandlerContext};
use crate::idempotency::DispatchError;
use async_trait::async_trait;
use ddd_domain::domain_event::Event;
use ddd_domain::error::{DomainError, DomainResult};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// 类型擦除后的处理器：负责把 JSON 载荷还原为具体事件再调用
#[async_trait]
pub trait DynEventHandler<S>: Send + Sync {
    fn handler_name(&self) -> &str;

    async fn invoke(
        &self,
        content: &str,
        ctx: &mut HandlerContext<'_, S>,
    ) -> Result<(), DispatchError>;
}

struct Typed<E, H> {
    handler: H,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, S, H> DynEventHandler<S> for Typed<E, H>
where
    E: Event,
    S: Send + 'static,
    H: EventHandler<E, S>,
{
    fn handler_name(&self) -> &str {
        self.handler.handler_name()
    }

    async fn invoke(
        &self,
        content: &str,
        ctx: &mut HandlerContext<'_, S>,
    ) -> Result<(), DispatchError> {
        let event: E = serde_json::from_str(content).map_err(|e| DispatchError::Payload {
            handler: self.handler_name().to_string(),
            error: e.into(),
        })?;
        self.handler
            .handle(event, ctx)
            .await
            .map_err(|error| DispatchError::Handler {
                handler: self.handler_name().to_string(),
                error,
            })
    }
}

/// 某一信箱的处理器注册表
pub struct HandlerRegistry<S> {
    by_kind: HashMap<&'static str, Vec<Arc<dyn DynEventHandler<S>>>>,
}

impl<S> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self {
            by_kind: HashMap::new(),
        }
    }
}

impl<S> Clone for HandlerRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            by_kind: self.by_kind.clone(),
        }
    }
}

impl<S: Send + 'static> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册事件 `E` 的处理器；同一事件种类下处理器名称必须唯一
    pub fn register<E, H>(&mut self, handler: H) -> DomainResult<()>
    where
        E: Event,
        H: EventHandler<E, S>,
    {
        let name = handler.handler_name();
        if name.is_empty() {
            return Err(DomainError::invalid_config(format!(
                "handler for {} has an empty name",
                E::KIND
            )));
        }

        let handlers = self.by_kind.entry(E::KIND).or_default();
        if handlers.iter().any(|h| h.handler_name() == name) {
            return Err(DomainError::invalid_config(format!(
                "handler `{name}` registered twice for {}",
                E::KIND
            )));
        }

        handlers.push(Arc::new(Typed {
            handler,
            _event: PhantomData,
        }));
        Ok(())
    }

    /// 链式注册
    pub fn with<E, H>(mut self, handler: H) -> DomainResult<Self>
    where
        E: Event,
        H: EventHandler<E, S>,
    {
        self.register::<E, H>(handler)?;
        Ok(self)
    }
}

impl<S> HandlerRegistry<S> {
    /// 按注册顺序返回处理器；未注册的种类返回空集
    pub fn handlers_for(&self, kind: &str) -> &[Arc<dyn DynEventHandler<S>>] {
        self.by_kind.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_kind.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}
