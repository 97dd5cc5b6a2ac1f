//! Livegrid SDK - 分页实时数据视图
//!
//! 把远端 REST 集合映射成本地的分页视图，并通过通知通道保持同步：
//! - 🪟 窗口缓存：只保留当前页及前后两页，已加载的页不重复请求
//! - 📡 推送对账：服务端的 create / update / delete 直接在本地对齐
//! - 🔔 细粒度变更通知：add / remove / replace，可直接绑定到 UI 列表
//! - 🔄 自动重连：传输层重连后重新加入全部 topic
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use livegrid_sdk::{HttpCollection, LivegridConfig, LoopbackTransport, MemoryFeed, NotificationHub, RemoteCollection, WindowedCache};
//! # use livegrid_sdk::{Entity, EntityDescriptor};
//! # #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
//! # struct Student { id: u64 }
//! # static DESCRIPTOR: EntityDescriptor<Student> = EntityDescriptor {
//! #     endpoint: "students", key_field: "id", searchable: &[], sortable: &[], lookups: &[],
//! # };
//! # impl Entity for Student {
//! #     type Key = u64;
//! #     fn key(&self) -> &u64 { &self.id }
//! #     fn set_key(&mut self, key: u64) { self.id = key; }
//! #     fn descriptor() -> &'static EntityDescriptor<Self> { &DESCRIPTOR }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LivegridConfig::builder()
//!         .api_base_url("https://school.example.com/api/v1/")
//!         .default_page_length(20)
//!         .build();
//!
//!     let remote: Arc<dyn RemoteCollection<Student>> = Arc::new(HttpCollection::<Student>::from_config(&config)?);
//!     let hub = NotificationHub::new(Arc::new(LoopbackTransport::new(MemoryFeed::new(), 64)));
//!
//!     let mut students = WindowedCache::new(remote, hub, &config);
//!     let mut pushes = students.init().await?;
//!
//!     students.add_listener(|change| println!("变更: {:?} @ {}", change.kind(), change.index()));
//!     students.set_sort("lastName", true).await?;
//!
//!     while let Some(event) = pushes.recv().await {
//!         students.apply(event).await?;
//!     }
//!
//!     students.dispose().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod connection_state;
pub mod entity;
pub mod error;
pub mod events;
pub mod feed;
pub mod http_client;
pub mod hub;
pub mod memory;
pub mod push;
pub mod remote;
pub mod transport;
pub mod version;

#[cfg(test)]
mod testing;

// 重新导出核心类型，方便使用
pub use cache::WindowedCache;
pub use config::{HttpClientConfig, LivegridConfig, LivegridConfigBuilder};
pub use connection_state::{ConnectionState, ConnectionStateManager, ConnectionStatus};
pub use entity::{Comparator, Entity, EntityDescriptor, KeyLookup, SearchableField, SortableField};
pub use error::{LivegridError, Result};
pub use events::{ChangeKind, ChangeListener, ChangeNotifier, ChangeStats, CollectionChange};
pub use feed::MemoryFeed;
pub use http_client::HttpCollection;
pub use hub::NotificationHub;
pub use memory::{sequential_keys, KeyGenerator, MemoryBackend};
pub use push::{PushEvent, PushEvents};
pub use remote::{PageRequest, PageResult, RemoteCollection};
pub use transport::{HubMessage, HubTransport, LoopbackTransport, ReconnectCallback};
pub use version::SDK_VERSION;
