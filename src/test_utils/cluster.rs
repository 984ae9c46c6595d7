use std::sync::Arc;

use tokio::sync::watch;

use crate::membership::Membership;
use crate::membership::StaticMembership;
use crate::network::LoopbackTransport;
use crate::network::PeerHandler;
use crate::network::PeerTransport;
use crate::node::JoinServerRequest;
use crate::node::Node;
use crate::node::NodeBuilder;
use crate::replication::MemConfigStorage;
use crate::roles::RoleDefinition;
use crate::Settings;

pub struct TestNode {
    pub uri: String,
    pub node: Arc<Node>,
    pub membership: Arc<StaticMembership>,
    pub storage: Arc<MemConfigStorage>,
}

/// Unconfigured nodes wired through one loopback transport. Every node sees
/// every other node alive until told otherwise.
pub struct TestCluster {
    pub transport: Arc<LoopbackTransport>,
    pub nodes: Vec<TestNode>,
    _shutdown: watch::Sender<()>,
}

pub fn test_uri(i: usize) -> String {
    format!("localhost:{}", 3301 + i)
}

impl TestCluster {
    pub async fn new(size: usize) -> Self {
        Self::with_roles(size, Vec::new).await
    }

    pub async fn with_roles<F>(
        size: usize,
        roles: F,
    ) -> Self
    where
        F: Fn() -> Vec<RoleDefinition>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let transport = Arc::new(LoopbackTransport::new());
        let uris: Vec<String> = (0..size).map(test_uri).collect();

        let mut nodes = Vec::with_capacity(size);
        for (i, uri) in uris.iter().enumerate() {
            let mut settings = Settings::default();
            settings.node.advertise_uri = uri.clone();
            settings.node.alias = format!("node-{}", i + 1);

            let membership = Arc::new(StaticMembership::new(uri.clone()));
            for other in uris.iter().filter(|u| *u != uri) {
                membership.set_alive(other, true);
            }
            let storage = Arc::new(MemConfigStorage::new());
            let node = NodeBuilder::new(settings, shutdown_rx.clone())
                .roles(roles())
                .transport(transport.clone() as Arc<dyn PeerTransport>)
                .membership(membership.clone() as Arc<dyn Membership>)
                .storage(storage.clone())
                .build()
                .await
                .unwrap();
            transport.register(uri.clone(), node.clone() as Arc<dyn PeerHandler>);
            nodes.push(TestNode {
                uri: uri.clone(),
                node,
                membership,
                storage,
            });
        }

        Self {
            transport,
            nodes,
            _shutdown: shutdown_tx,
        }
    }

    pub fn node(
        &self,
        i: usize,
    ) -> &Arc<Node> {
        &self.nodes[i].node
    }

    /// Bootstraps the cluster on node 0 and joins every other node, each into
    /// its own replicaset. Returns the server uuids.
    pub async fn bootstrap(&self) -> Vec<String> {
        let first = self.node(0);
        let mut uuids = Vec::new();
        for n in &self.nodes {
            uuids.push(first.join_server(JoinServerRequest::new(n.uri.clone())).await.unwrap());
        }
        uuids
    }

    /// Peer stops answering and everyone notices
    pub fn kill(
        &self,
        i: usize,
    ) {
        let uri = &self.nodes[i].uri;
        self.transport.kill(uri);
        for (j, n) in self.nodes.iter().enumerate() {
            if j != i {
                n.membership.set_alive(uri, false);
            }
        }
    }

    pub fn revive(
        &self,
        i: usize,
    ) {
        let target = &self.nodes[i];
        self.transport
            .register(target.uri.clone(), target.node.clone() as Arc<dyn PeerHandler>);
        for (j, n) in self.nodes.iter().enumerate() {
            if j != i {
                n.membership.set_alive(&target.uri, true);
            }
        }
    }

    /// Re-elects leaders on every node, as the failover loop would
    pub fn recompute_failover(&self) {
        for n in &self.nodes {
            n.node.failover().recompute();
        }
    }
}
