//! 持久化记录（Record）
//!
//! 业务表中的一行：以表名与主键定位。缓存投影（其他模块聚合的只读镜像）
//! 通过 `WRITE_PROTECTED = true` 标记，其写入仅允许发生在集成事件处理器
//! 打开的缓存写入作用域内。
//!
use serde::Serialize;
use serde::de::DeserializeOwned;

pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 所属表名（建议带模块前缀，如 `customers.order_cache`）
    const TABLE: &'static str;

    /// 是否为写保护的缓存投影
    const WRITE_PROTECTED: bool = false;

    /// 主键
    fn key(&self) -> String;
}
