//! 单元测试用的实体与测试夹具

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::WindowedCache;
use crate::config::LivegridConfig;
use crate::entity::{Entity, EntityDescriptor, KeyLookup, SearchableField, SortableField};
use crate::feed::MemoryFeed;
use crate::hub::NotificationHub;
use crate::memory::{sequential_keys, MemoryBackend};
use crate::transport::LoopbackTransport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: u64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

static STUDENT_DESCRIPTOR: EntityDescriptor<Student> = EntityDescriptor {
    endpoint: "students",
    key_field: "id",
    searchable: &[
        SearchableField { name: "email", text: |s| s.email.clone() },
        SearchableField { name: "firstName", text: |s| s.first_name.clone() },
        SearchableField { name: "lastName", text: |s| s.last_name.clone() },
    ],
    sortable: &[
        SortableField { name: "email", compare: |a, b| a.email.cmp(&b.email) },
        SortableField { name: "firstName", compare: |a, b| a.first_name.cmp(&b.first_name) },
        SortableField { name: "lastName", compare: |a, b| a.last_name.cmp(&b.last_name) },
    ],
    lookups: &[
        KeyLookup {
            field: "id",
            matches: |s, raw| raw.parse::<u64>().ok().map(|id| s.id == id),
        },
        KeyLookup {
            field: "email",
            matches: |s, raw| Some(s.email == raw),
        },
    ],
};

impl Entity for Student {
    type Key = u64;

    fn key(&self) -> &u64 {
        &self.id
    }

    fn set_key(&mut self, key: u64) {
        self.id = key;
    }

    fn descriptor() -> &'static EntityDescriptor<Self> {
        &STUDENT_DESCRIPTOR
    }
}

pub fn student(id: u64, first_name: &str, email: &str) -> Student {
    Student {
        id,
        email: email.to_string(),
        first_name: first_name.to_string(),
        last_name: "Learner".to_string(),
    }
}

/// id 为 1..=n，名字为 Student01、Student02…
pub fn students(n: u64) -> Vec<Student> {
    (1..=n)
        .map(|i| student(i, &format!("Student{:02}", i), &format!("s{}@school.edu", i)))
        .collect()
}

/// 内存后端 + 回环 hub + 窗口缓存
pub struct Harness {
    pub feed: MemoryFeed,
    pub backend: Arc<MemoryBackend<Student>>,
    pub transport: LoopbackTransport,
    pub hub: NotificationHub,
    pub cache: WindowedCache<Student>,
}

impl Harness {
    /// 预置 n 条数据，新建数据的主键从 n + 1 开始
    pub fn new(n: u64, page_length: usize) -> Self {
        let feed = MemoryFeed::new();
        let backend = Arc::new(MemoryBackend::new(feed.clone(), sequential_keys(n as u32 + 1)));
        backend.seed(students(n));

        let transport = LoopbackTransport::new(feed.clone(), 64);
        let hub = NotificationHub::new(Arc::new(transport.clone()));
        let config = LivegridConfig::builder().default_page_length(page_length).build();
        let cache: WindowedCache<Student> = WindowedCache::new(backend.clone(), hub.clone(), &config);

        Self {
            feed,
            backend,
            transport,
            hub,
            cache,
        }
    }

    /// 缓存当前页已加载数据的主键
    pub fn page_ids(&self) -> Vec<u64> {
        self.cache.page_items().iter().map(|s| s.id).collect()
    }
}
