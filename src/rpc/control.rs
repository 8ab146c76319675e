// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! gRPC-backed control tunnels.
//!
//! The control protocol is two unary calls; the client side is written
//! directly against `tonic::client::Grpc` rather than generated stubs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tracing::{debug, warn};

use crate::common::error::RpcError;
use crate::common::ids::{Endpoint, FragmentHandle};
use crate::proto;
use crate::rpc::{ControlTunnel, Controller, RpcOutcomeListener};

const SEND_FRAGMENTS_PATH: &str = "/auger.Control/SendFragments";
const CANCEL_FRAGMENT_PATH: &str = "/auger.Control/CancelFragment";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ChannelCache {
    mu: Mutex<HashMap<String, Channel>>,
}

static CHANNELS: OnceLock<ChannelCache> = OnceLock::new();

fn channels() -> &'static ChannelCache {
    CHANNELS.get_or_init(ChannelCache::default)
}

fn client_runtime() -> &'static tokio::runtime::Runtime {
    static RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(4)
            .thread_name("control-rpc")
            .build()
            .expect("build control rpc runtime")
    })
}

async fn get_channel(endpoint: &Endpoint) -> Result<Channel, String> {
    let key = endpoint.to_string();
    if let Some(ch) = channels()
        .mu
        .lock()
        .expect("channel cache lock")
        .get(&key)
        .cloned()
    {
        return Ok(ch);
    }

    debug!("control channel: connecting to {}", key);
    let channel = format!("http://{key}")
        .parse::<tonic::transport::Endpoint>()
        .map_err(|e| format!("invalid control endpoint {key}: {e}"))?
        .tcp_keepalive(Some(TCP_KEEPALIVE))
        .connect_timeout(CONNECT_TIMEOUT)
        .connect()
        .await
        .map_err(|e| format!("connect to {key} failed: {e}"))?;

    channels()
        .mu
        .lock()
        .expect("channel cache lock")
        .insert(key, channel.clone());
    Ok(channel)
}

async fn unary_call<Req, Resp>(
    endpoint: &Endpoint,
    path: &'static str,
    request: Req,
) -> Result<Resp, String>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    let channel = get_channel(endpoint).await?;
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| format!("control channel to {endpoint} not ready: {e}"))?;
    let codec: tonic::codec::ProstCodec<Req, Resp> = tonic::codec::ProstCodec::default();
    let response = grpc
        .unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await
        .map_err(|status| format!("{path} to {endpoint} failed: {status}"))?;
    Ok(response.into_inner())
}

/// Tunnel provider backed by a per-endpoint gRPC channel cache shared across
/// all queries on this node.
#[derive(Default)]
pub struct GrpcController;

impl GrpcController {
    pub fn new() -> Self {
        Self
    }
}

impl Controller for GrpcController {
    fn tunnel(&self, endpoint: &Endpoint) -> Arc<dyn ControlTunnel> {
        Arc::new(GrpcControlTunnel {
            endpoint: endpoint.clone(),
        })
    }
}

struct GrpcControlTunnel {
    endpoint: Endpoint,
}

impl ControlTunnel for GrpcControlTunnel {
    fn send_fragments(
        &self,
        listener: Box<dyn RpcOutcomeListener>,
        fragments: proto::InitializeFragments,
    ) {
        let endpoint = self.endpoint.clone();
        client_runtime().spawn(async move {
            match unary_call::<proto::InitializeFragments, proto::Ack>(
                &endpoint,
                SEND_FRAGMENTS_PATH,
                fragments,
            )
            .await
            {
                Ok(_) => listener.success(),
                Err(message) => listener.failed(RpcError::new(message)),
            }
        });
    }

    fn cancel_fragment(&self, handle: FragmentHandle) {
        let endpoint = self.endpoint.clone();
        client_runtime().spawn(async move {
            let request: proto::FragmentHandle = handle.into();
            if let Err(e) =
                unary_call::<proto::FragmentHandle, proto::Ack>(&endpoint, CANCEL_FRAGMENT_PATH, request)
                    .await
            {
                // Cancellation is best-effort; the peer may already be gone.
                warn!("cancel of fragment {} on {} failed: {}", handle, endpoint, e);
            }
        });
    }
}
