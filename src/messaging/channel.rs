// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::utils::errors::ChannelError;

/// 携带回复通道的请求信封
pub struct Envelope<Req, Resp> {
    request: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> Envelope<Req, Resp> {
    pub fn request(&self) -> &Req {
        &self.request
    }

    /// 拆分为请求和回复句柄，处理方可以持有回复句柄任意长时间
    pub fn into_parts(self) -> (Req, Responder<Resp>) {
        (self.request, Responder { reply: self.reply })
    }
}

/// 延迟回复句柄
pub struct Responder<Resp> {
    reply: oneshot::Sender<Resp>,
}

impl<Resp> Responder<Resp> {
    /// 发送回复，请求方已放弃等待时返回 false
    pub fn respond(self, response: Resp) -> bool {
        self.reply.send(response).is_ok()
    }
}

/// 请求方端点
pub struct Endpoint<Req, Resp> {
    tx: mpsc::Sender<Envelope<Req, Resp>>,
}

impl<Req, Resp> Clone for Endpoint<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Req, Resp> Endpoint<Req, Resp> {
    /// 发送请求并等待回复
    pub async fn request(&self, request: Req) -> Result<Resp, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        rx.await.map_err(|_| ChannelError::NoReply)
    }

    /// 带超时的请求
    pub async fn request_timeout(
        &self,
        request: Req,
        timeout: Duration,
    ) -> Result<Resp, ChannelError> {
        tokio::time::timeout(timeout, self.request(request))
            .await
            .map_err(|_| ChannelError::Timeout)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 处理方收件箱，按发送顺序交付请求
pub struct Inbox<Req, Resp> {
    rx: mpsc::Receiver<Envelope<Req, Resp>>,
}

impl<Req, Resp> Inbox<Req, Resp> {
    pub async fn recv(&mut self) -> Option<Envelope<Req, Resp>> {
        self.rx.recv().await
    }
}

/// 创建有序的请求/回复通道
pub fn channel<Req, Resp>(capacity: usize) -> (Endpoint<Req, Resp>, Inbox<Req, Resp>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Endpoint { tx }, Inbox { rx })
}
