use crate::config::BazBeansConfig;
use crate::coordinator::CoordinatorClient;
use crate::error::Result;
use crate::types::{Command, CommandResult, NodeId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-node FIFO command queue: operators push to the tail, the agent pops
/// from the head once per tick. Push is unbounded; pop is non-blocking —
/// absence of a command is reported as `None`, not awaited.
pub struct CommandBus<C: CoordinatorClient> {
    client: Arc<C>,
    config: Arc<BazBeansConfig>,
}

impl<C: CoordinatorClient> CommandBus<C> {
    pub fn new(client: Arc<C>, config: Arc<BazBeansConfig>) -> Self {
        Self { client, config }
    }

    pub async fn send_command(&self, node_id: &NodeId, command: &Command) -> Result<()> {
        let json = serde_json::to_string(command)?;
        self.client.rpush(&self.config.command_queue_key_for(node_id.as_ref()), json).await
    }

    /// Pops the next command for this process's own node, assigning it a
    /// fresh correlation id at dequeue time (the wire protocol carries none;
    /// see `SPEC_FULL.md` §4.3).
    pub async fn get_command(&self) -> Result<Option<Command>> {
        let raw = self.client.lpop(&self.config.command_queue_key()).await?;
        match raw {
            Some(raw) => {
                let mut command: Command = serde_json::from_str(&raw)?;
                if command.id.is_none() {
                    command.id = Some(uuid::Uuid::new_v4());
                }
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }
}

/// Bounded ring of recently executed commands, kept in process memory as a
/// strict superset of the overwriting status-hash write every result also
/// receives. Purely observational — never consulted for dispatch.
pub struct RecentResults {
    capacity: usize,
    ring: Mutex<VecDeque<CommandResult>>,
}

impl RecentResults {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn push(&self, result: CommandResult) {
        let mut ring = self.ring.lock().await;
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(result);
    }

    pub async fn snapshot(&self) -> Vec<CommandResult> {
        self.ring.lock().await.iter().cloned().collect()
    }
}

impl Default for RecentResults {
    fn default() -> Self {
        Self::new(16)
    }
}
