//! 窗口缓存演示
//!
//! 进程内后端 + 回环通知通道：另一个任务不断增删改课程，
//! 缓存通过推送对齐本地窗口并打印变更。

use std::sync::Arc;
use std::time::Duration;

use livegrid_sdk::{
    sequential_keys, CollectionChange, Entity, EntityDescriptor, KeyLookup, LivegridConfig, LoopbackTransport,
    MemoryBackend, MemoryFeed, NotificationHub, RemoteCollection, SearchableField, SortableField, WindowedCache,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Course {
    id: u32,
    title: String,
    credits: u32,
}

static COURSE_DESCRIPTOR: EntityDescriptor<Course> = EntityDescriptor {
    endpoint: "courses",
    key_field: "id",
    searchable: &[SearchableField { name: "title", text: |c| c.title.clone() }],
    sortable: &[
        SortableField { name: "title", compare: |a, b| a.title.cmp(&b.title) },
        SortableField { name: "credits", compare: |a, b| a.credits.cmp(&b.credits) },
    ],
    lookups: &[
        KeyLookup {
            field: "id",
            matches: |c, raw| raw.parse::<u32>().ok().map(|id| c.id == id),
        },
        KeyLookup {
            field: "title",
            matches: |c, raw| Some(c.title.eq_ignore_ascii_case(raw)),
        },
    ],
};

impl Entity for Course {
    type Key = u32;

    fn key(&self) -> &u32 {
        &self.id
    }

    fn set_key(&mut self, key: u32) {
        self.id = key;
    }

    fn descriptor() -> &'static EntityDescriptor<Self> {
        &COURSE_DESCRIPTOR
    }
}

fn course(title: &str, credits: u32) -> Course {
    Course {
        id: 0,
        title: title.to_string(),
        credits,
    }
}

fn print_page(cache: &WindowedCache<Course>) {
    println!(
        "📄 第 {}/{} 页（共 {} 条）",
        cache.page() + 1,
        cache.pages(),
        cache.total_items()
    );
    for c in cache.page_items() {
        println!("   #{:<3} {:<28} {} 学分", c.id, c.title, c.credits);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("\n🚀 窗口缓存演示\n");
    println!("====================================\n");

    let config = LivegridConfig::builder().default_page_length(5).build();
    config.validate()?;

    let feed = MemoryFeed::new();
    let backend = Arc::new(MemoryBackend::<Course>::new(feed.clone(), sequential_keys(1)));
    let titles = [
        "Algebra", "Biology", "Chemistry", "Databases", "Economics", "French", "Geology", "History",
        "Informatics", "Journalism", "Kinesiology", "Linguistics",
    ];
    for (i, title) in titles.iter().enumerate() {
        backend.create(&course(title, 3 + (i as u32 % 3))).await?;
    }

    let transport = LoopbackTransport::new(feed, config.event_buffer_size);
    let hub = NotificationHub::new(Arc::new(transport.clone()));
    let remote: Arc<dyn RemoteCollection<Course>> = backend.clone();
    let mut cache = WindowedCache::new(remote, hub, &config);

    cache.add_listener(|change| match change {
        CollectionChange::Add { items, index } => println!("   ➕ add {} 条 @ {}", items.len(), index),
        CollectionChange::Remove { item, index } => println!("   ➖ remove {} @ {}", item.title, index),
        CollectionChange::Replace { item, index, .. } => println!("   ✏️  replace {} @ {}", item.title, index),
    });

    let mut pushes = cache.init().await?;
    cache.set_sort("title", true).await?;
    cache.next_page().await?;
    print_page(&cache);

    // 另一个客户端修改数据
    let writer = backend.clone();
    tokio::spawn(async move {
        for (title, credits) in [("Astronomy", 4), ("Ethics", 2), ("Zoology", 5)] {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if let Err(e) = writer.create(&course(title, credits)).await {
                eprintln!("创建失败: {}", e);
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = writer.update(&Course { id: 8, title: "History of Art".to_string(), credits: 4 }).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = writer.remove(&6).await;
    });

    // 模拟一次断线重连，topic 会被自动重新加入
    let reconnecting = transport.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Err(e) = reconnecting.simulate_reconnect().await {
            eprintln!("重连失败: {}", e);
        }
    });

    let deadline = tokio::time::sleep(Duration::from_secs(2));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = pushes.recv() => {
                let Some(event) = event else { break };
                info!("📥 推送: {:?}", event);
                cache.apply(event).await?;
                print_page(&cache);
            }
            _ = &mut deadline => break,
        }
    }

    let stats = cache.change_stats();
    println!("\n📊 共 {} 次变更: {:?}", stats.total_changes, stats.changes_by_kind);
    println!("{}", transport.connection_state().summary());

    cache.dispose().await?;
    println!("\n✅ 演示结束");
    Ok(())
}
