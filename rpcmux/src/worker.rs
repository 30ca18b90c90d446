//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Off-reactor execution of service methods.
//!
//! A [`TypedService`](crate::TypedService) decodes and invokes methods on the
//! reactor thread unless it is given a [`WorkerPool`]. With a pool, the
//! reactor only resolves the method and hands the rest over.

use tokio::runtime::Handle;

/// A job executor.
pub trait WorkerPool: Send + Sync + 'static {
    /// Runs `job` at some point on some other thread.
    fn submit(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Runs jobs on the blocking pool of a tokio runtime.
impl WorkerPool for Handle {
    fn submit(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        drop(self.spawn_blocking(job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handle_runs_jobs_elsewhere() {
        let pool: Arc<dyn WorkerPool> = Arc::new(Handle::current());
        let caller = std::thread::current().id();
        let (tx, rx) = oneshot::channel();

        pool.submit(Box::new(move || {
            let _ = tx.send(std::thread::current().id());
        }));

        assert_ne!(rx.await.unwrap(), caller);
    }
}
