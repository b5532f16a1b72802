//! 缓存写入作用域（CacheWriteScope）
//!
//! 跨模块缓存投影只能反映经集成事件收到的数据，因此对它们的写入仅在
//! 集成事件处理器显式打开作用域时允许：
//! - 默认关闭；`allow_writes()` 打开并返回守卫；
//! - 守卫在任何退出路径（包括 `?` 提前返回与 panic 展开）被释放时恢复关闭；
//! - 关闭状态下写入投影立即失败（`DomainError::ProjectionWriteDenied`）。
//!
//! 作用域状态挂在存储会话上，随处理器上下文显式传递，不使用线程局部变量。
//!
use ddd_domain::error::{DomainError, DomainResult};
use ddd_domain::record::Record;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Default)]
pub struct CacheWriteScope {
    open: bool,
}

impl CacheWriteScope {
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// 写入记录前的检查：写保护记录要求作用域已打开
    pub fn ensure_writable<R: Record>(&self) -> DomainResult<()> {
        if R::WRITE_PROTECTED && !self.open {
            return Err(DomainError::ProjectionWriteDenied { entity: R::TABLE });
        }
        Ok(())
    }
}

/// 持有缓存写入作用域的会话
pub trait CacheScoped {
    fn cache_write_scope(&self) -> &CacheWriteScope;

    fn cache_write_scope_mut(&mut self) -> &mut CacheWriteScope;

    /// 打开缓存写入作用域，返回的守卫可像会话本身一样使用
    fn allow_writes(&mut self) -> CacheWriteGuard<'_, Self>
    where
        Self: Sized,
    {
        CacheWriteGuard::open(self)
    }
}

/// 作用域守卫：存活期间作用域保持打开，释放时恢复进入前的状态
pub struct CacheWriteGuard<'a, S: CacheScoped> {
    session: &'a mut S,
    was_open: bool,
}

impl<'a, S: CacheScoped> CacheWriteGuard<'a, S> {
    pub fn open(session: &'a mut S) -> Self {
        let scope = session.cache_write_scope_mut();
        let was_open = scope.open;
        scope.open = true;
        Self { session, was_open }
    }
}

impl<S: CacheScoped> Deref for CacheWriteGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: CacheScoped> DerefMut for CacheWriteGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
    }
}

impl<S: CacheScoped> Drop for CacheWriteGuard<'_, S> {
    fn drop(&mut self) {
        self.session.cache_write_scope_mut().open = self.was_open;
    }
}
