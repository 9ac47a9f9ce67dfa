use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::bundle::BundleLoader;
use crate::command::CommandSender;
use crate::manifest::BundleCatalog;
use crate::task::Task;
use crate::Source;

/// Collaborators the registry hands to fetch tasks.
#[derive(Debug)]
pub struct SharedData {
    pub commands: CommandSender,
    pub source: Arc<dyn Source>,
    pub bundle_loader: Arc<dyn BundleLoader>,
    pub catalog: Arc<dyn BundleCatalog>,
    pub runtime: Runtime,
}

impl SharedData {
    pub fn spawn(&self, task: Task) {
        task.spawn(&self.runtime, &self.commands);
    }
}
