// 交互式会话输出读取
//
// 交互式 shell 没有"命令结束"信号，只能按时间读取：
// - FixedSettle: 固定等待后，只取已经到达的数据
// - Adaptive: 指数退避轮询，有数据后安静一个步长即返回，最长不超过 deadline

use std::cmp::min;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout, Instant};

use super::config::DrainMode;

/// 通道上的一段数据
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamChunk {
    /// 标准输出
    Stdout(Vec<u8>),
    /// 标准错误
    Stderr(Vec<u8>),
    /// 通道已关闭（EOF / Close）
    Closed,
}

/// 可以逐段读取的数据源
#[async_trait]
pub trait ChunkSource: Send {
    /// 等待下一段数据，必须可以被安全取消
    async fn next_chunk(&mut self) -> StreamChunk;
}

/// 读取结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Drained {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// 远端已关闭通道
    pub closed: bool,
}

impl Drained {
    /// 追加一段数据，返回通道是否已关闭
    fn push(&mut self, chunk: StreamChunk) -> bool {
        match chunk {
            StreamChunk::Stdout(data) => self.stdout.extend_from_slice(&data),
            StreamChunk::Stderr(data) => self.stderr.extend_from_slice(&data),
            StreamChunk::Closed => self.closed = true,
        }
        self.closed
    }

    fn has_data(&self) -> bool {
        !self.stdout.is_empty() || !self.stderr.is_empty()
    }
}

/// 按 DrainMode 读取
pub async fn drain<S: ChunkSource + ?Sized>(source: &mut S, mode: DrainMode) -> Drained {
    match mode {
        DrainMode::FixedSettle { settle_ms } => {
            drain_fixed(source, Duration::from_millis(settle_ms)).await
        }
        DrainMode::Adaptive {
            initial_ms,
            max_step_ms,
            deadline_ms,
        } => {
            drain_adaptive(
                source,
                Duration::from_millis(initial_ms.max(1)),
                Duration::from_millis(max_step_ms.max(initial_ms).max(1)),
                Duration::from_millis(deadline_ms),
            )
            .await
        }
    }
}

/// 固定等待 settle，然后只取已经就绪的数据
async fn drain_fixed<S: ChunkSource + ?Sized>(source: &mut S, settle: Duration) -> Drained {
    sleep(settle).await;

    let mut drained = Drained::default();
    // 零超时：数据已在缓冲区时立即返回，否则视为没有更多数据
    while let Ok(chunk) = timeout(Duration::ZERO, source.next_chunk()).await {
        if drained.push(chunk) {
            break;
        }
    }
    drained
}

/// 指数退避轮询
async fn drain_adaptive<S: ChunkSource + ?Sized>(
    source: &mut S,
    initial: Duration,
    max_step: Duration,
    deadline: Duration,
) -> Drained {
    let deadline = Instant::now() + deadline;
    let mut step = initial;
    let mut drained = Drained::default();

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let wait = min(step, deadline - now);
        match timeout(wait, source.next_chunk()).await {
            Ok(chunk) => {
                if drained.push(chunk) {
                    break;
                }
                step = initial;
            }
            Err(_) => {
                if drained.has_data() {
                    break;
                }
                step = min(step * 2, max_step);
            }
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[async_trait]
    impl ChunkSource for mpsc::Receiver<StreamChunk> {
        async fn next_chunk(&mut self) -> StreamChunk {
            self.recv().await.unwrap_or(StreamChunk::Closed)
        }
    }

    /// 按给定时间点发送数据，返回接收端和发送任务
    fn scripted(
        script: Vec<(u64, StreamChunk)>,
    ) -> (mpsc::Receiver<StreamChunk>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            let start = Instant::now();
            for (at_ms, chunk) in script {
                tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            // 保持发送端存活，避免被当作通道关闭
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        (rx, task)
    }

    fn out(s: &str) -> StreamChunk {
        StreamChunk::Stdout(s.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_fixed_settle_takes_only_ready_data() {
        let (mut rx, task) = scripted(vec![
            (0, out("a")),
            (20, out("b")),
            (20, StreamChunk::Stderr(b"warn".to_vec())),
            (600, out("late")),
        ]);

        let drained = drain(&mut rx, DrainMode::FixedSettle { settle_ms: 150 }).await;
        assert_eq!(drained.stdout, b"ab");
        assert_eq!(drained.stderr, b"warn");
        assert!(!drained.closed);
        task.abort();
    }

    #[tokio::test]
    async fn test_fixed_settle_empty() {
        let (mut rx, task) = scripted(vec![]);
        let drained = drain(&mut rx, DrainMode::FixedSettle { settle_ms: 10 }).await;
        assert_eq!(drained, Drained::default());
        task.abort();
    }

    #[tokio::test]
    async fn test_adaptive_returns_early_after_data() {
        let (mut rx, task) = scripted(vec![(10, out("prompt$ "))]);
        let started = Instant::now();

        let drained = drain(
            &mut rx,
            DrainMode::Adaptive {
                initial_ms: 20,
                max_step_ms: 200,
                deadline_ms: 5000,
            },
        )
        .await;

        assert_eq!(drained.stdout, b"prompt$ ");
        assert!(started.elapsed() < Duration::from_millis(2000));
        task.abort();
    }

    #[tokio::test]
    async fn test_adaptive_collects_slow_output() {
        // 固定等待会丢掉 300ms 后的数据，自适应模式可以等到
        let (mut rx, task) = scripted(vec![(300, out("slow")), (310, out(" done"))]);

        let drained = drain(
            &mut rx,
            DrainMode::Adaptive {
                initial_ms: 20,
                max_step_ms: 400,
                deadline_ms: 3000,
            },
        )
        .await;

        assert_eq!(drained.stdout, b"slow done");
        task.abort();
    }

    #[tokio::test]
    async fn test_adaptive_deadline_without_data() {
        let (mut rx, task) = scripted(vec![]);
        let started = Instant::now();

        let drained = drain(
            &mut rx,
            DrainMode::Adaptive {
                initial_ms: 10,
                max_step_ms: 40,
                deadline_ms: 150,
            },
        )
        .await;

        assert_eq!(drained, Drained::default());
        assert!(started.elapsed() >= Duration::from_millis(150));
        task.abort();
    }

    #[tokio::test]
    async fn test_closed_channel_stops_drain() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(out("bye")).await.unwrap();
        drop(tx);

        let drained = drain(
            &mut rx,
            DrainMode::Adaptive {
                initial_ms: 10,
                max_step_ms: 100,
                deadline_ms: 5000,
            },
        )
        .await;

        assert_eq!(drained.stdout, b"bye");
        assert!(drained.closed);
    }
}
