//! 模块化单体示例：订单模块下单/取消，客户模块经 Inbox 维护订单缓存
//!
pub mod app;
pub mod customers;
pub mod orders;

pub use app::Shop;
