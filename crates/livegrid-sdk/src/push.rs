//! 实体推送事件
//!
//! 从 hub 的原始消息流中挑出 `<endpoint>_create|_update|_delete`，解码成
//! [`PushEvent`]。单条消息解码失败只会被记录并跳过，不会中断整条流。

use std::marker::PhantomData;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::entity::Entity;
use crate::error::Result;
use crate::transport::HubMessage;

/// 服务端推送的实体变更
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent<T: Entity> {
    Created(T),
    Updated(T),
    Deleted(T::Key),
}

/// 某个实体类型的推送流
#[derive(Debug)]
pub struct PushEvents<T: Entity> {
    receiver: broadcast::Receiver<HubMessage>,
    create: String,
    update: String,
    delete: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> PushEvents<T> {
    pub fn new(receiver: broadcast::Receiver<HubMessage>) -> Self {
        let descriptor = T::descriptor();
        Self {
            receiver,
            create: descriptor.create_event(),
            update: descriptor.update_event(),
            delete: descriptor.delete_event(),
            _marker: PhantomData,
        }
    }

    /// 解码一条消息；不属于该实体类型时返回 `None`
    pub fn decode(&self, message: &HubMessage) -> Option<Result<PushEvent<T>>> {
        let payload = message.payload.clone();
        let event = if message.target == self.create {
            serde_json::from_value(payload).map(PushEvent::Created)
        } else if message.target == self.update {
            serde_json::from_value(payload).map(PushEvent::Updated)
        } else if message.target == self.delete {
            serde_json::from_value(payload).map(PushEvent::Deleted)
        } else {
            return None;
        };
        Some(event.map_err(Into::into))
    }

    fn accept(&self, message: &HubMessage) -> Option<PushEvent<T>> {
        match self.decode(message)? {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("⚠️ 丢弃无法解析的推送 {}: {}", message.target, e);
                None
            }
        }
    }

    /// 等待下一条推送；通道关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<PushEvent<T>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => {
                    if let Some(event) = self.accept(&message) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ 推送消费过慢，丢失 {} 条消息", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// 取出一条已到达的推送，没有则立即返回 `None`
    pub fn try_recv(&mut self) -> Option<PushEvent<T>> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if let Some(event) = self.accept(&message) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("⚠️ 推送消费过慢，丢失 {} 条消息", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
