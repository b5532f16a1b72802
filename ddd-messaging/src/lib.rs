//! 事务性 Outbox/Inbox 可靠投递引擎（ddd-messaging）
//!
//! 模块在同一事务中提交业务状态与“发生了什么”的事件，引擎随后以
//! 至少一次的语义把事件投递给本模块与其他模块的处理器：
//! - Outbox：领域事件 → 持久化消息 → 周期作业分发 → 幂等调用处理器 → 重试/退避 → 毒消息放弃；
//! - Inbox：集成事件接收 → 持久化消息 → 幂等分发 → 重试/退避；
//! - 调度：每个模块两个处理作业，受特性开关控制，互不重叠；
//! - 缓存写保护：跨模块缓存投影只能在集成事件处理器显式打开的作用域内写入。
//!
//! 典型装配：
//! 1. 为每个模块创建存储（`MemoryDatabase` 或 feature `postgres` 下的 `PostgresMessageStore`）
//!    与 `MessagingModule`，注册领域事件/集成事件处理器；
//! 2. 创建事件总线（`InProcessEventBus` 或 `BrokerEventBus`），订阅各模块的 `inbox()`；
//! 3. 把各模块的 `processors(...)` 加入 `Scheduler` 并 `start()`；
//! 4. 业务命令经由 `unit_of_work()` 提交状态与领域事件。
//!
pub mod bus;
pub mod cache_scope;
pub mod clock;
pub mod config;
pub mod feature_flags;
pub mod handler;
pub mod idempotency;
pub mod inbox;
pub mod message;
pub mod module;
pub mod outbox;
pub mod processor;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod serializer;
pub mod store;

pub use bus::{BrokerConsumerJob, BrokerEventBus, EventBus, InMemoryBroker, InProcessEventBus};
pub use cache_scope::{CacheScoped, CacheWriteGuard, CacheWriteScope};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{JobSettings, MessagingSettings, ModuleSettings};
pub use feature_flags::{FeatureFlags, StaticFeatureFlags, job_flag_path};
pub use handler::{EventHandler, HandlerContext};
pub use idempotency::{DispatchError, IdempotentHandler, InvocationOutcome};
pub use inbox::{Inbox, InboxReceiver, Receipt};
pub use message::{Message, MessageBox};
pub use module::MessagingModule;
pub use outbox::UnitOfWork;
pub use processor::{BatchReport, MessageOutcome, MessageProcessor};
pub use registry::HandlerRegistry;
pub use retry::RetryPolicy;
pub use scheduler::{Job, Scheduler, SchedulerHandle};
pub use serializer::{EventSerializer, IntegrationEnvelope};
pub use store::MessageStore;
pub use store::memory::{MemoryDatabase, MemorySession};
#[cfg(feature = "postgres")]
pub use store::postgres::{PgSession, PostgresMessageStore};
