//! 聚合（Aggregate）抽象
//!
//! 约束一个聚合的核心行为：
//! - 命令方法直接修改状态，并把对应的领域事件登记到 `RaisedEvents`；
//! - 工作单元提交时取出这些事件，与状态变更在同一事务中写入 Outbox；
//! - 通过 `Entity` 约束聚合具备标识。
//!
use crate::domain_event::RaisedEvents;
use crate::entity::Entity;

/// 聚合根接口
pub trait Aggregate: Entity {
    const TYPE: &'static str;

    /// 尚未持久化的领域事件缓冲区
    fn raised_events(&mut self) -> &mut RaisedEvents;
}
