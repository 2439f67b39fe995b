// 运行记录数据库模块
//
// DuckDB 连接只能由一个线程使用，这里沿用 Actor 模式：所有读写都通过
// 消息发送给持有连接的 Actor，调用方拿到的是可克隆的异步句柄。
//
// 主要组件：
// - DuckDbManager: 异步、类型安全的API接口
// - DuckDbActor: 内部Actor，执行实际的SQL
// - DbMessage: 请求与应答通道定义

mod actor;
mod manager;
mod messages;

pub use manager::DuckDbManager;
pub use messages::RunSummary;
