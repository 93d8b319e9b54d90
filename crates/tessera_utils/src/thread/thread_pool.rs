use std::{sync::mpsc, thread};

#[cfg(feature = "debug")]
use log::trace;
use log::{debug, warn};

use crate::thread::Mutator;

enum Message {
  NewJob(Job),
  Terminate,
}

pub struct ThreadPool {
  workers: Vec<Worker>,
  sender: mpsc::Sender<Message>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl ThreadPool {
  pub fn new(size: usize) -> Self {
    assert!(size > 0);
    debug!("Starting thread pool with {} workers", size);

    let (sender, receiver) = mpsc::channel();
    let receiver = Mutator::new(receiver);

    let mut workers = Vec::with_capacity(size);

    for id in 0..size {
      workers.push(Worker::new(id, Mutator::inner_clone(&receiver)));
    }

    ThreadPool { workers, sender }
  }

  pub fn size(&self) -> usize {
    self.workers.len()
  }

  pub fn execute<F>(&self, f: F)
  where
    F: FnOnce() + Send + 'static,
  {
    let job = Box::new(f);

    if self.sender.send(Message::NewJob(job)).is_err() {
      warn!("Thread pool has no running workers, job dropped");
    }
  }
}

impl Drop for ThreadPool {
  fn drop(&mut self) {
    debug!("Sending terminate message to all workers");
    for _ in &self.workers {
      let _ = self.sender.send(Message::Terminate);
    }

    while let Some(worker) = self.workers.pop() {
      #[cfg(feature = "debug")]
      trace!("Shutting down worker {}", worker.id);
      if worker.thread.join().is_err() {
        warn!("Worker {} terminated with a panic", worker.id);
      }
    }
  }
}

struct Worker {
  id: usize,
  thread: thread::JoinHandle<()>,
}

impl Worker {
  fn new(id: usize, receiver: Mutator<mpsc::Receiver<Message>>) -> Self {
    let thread = thread::spawn(move || loop {
      let message = receiver.get().recv();

      match message {
        Ok(Message::NewJob(job)) => {
          #[cfg(feature = "debug")]
          trace!("Worker {} got a job", id);

          job();
        }
        Ok(Message::Terminate) | Err(_) => break,
      }
    });

    Worker { id, thread }
  }
}

#[cfg(test)]
mod test {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use super::ThreadPool;
  use crate::thread::Latch;

  #[test]
  fn runs_every_job() {
    let pool = ThreadPool::new(3);
    let counter = Arc::new(AtomicUsize::new(0));
    let latch = Latch::new(32);

    for _ in 0..32 {
      let counter = counter.clone();
      let latch = latch.clone();
      pool.execute(move || {
        counter.fetch_add(1, Ordering::Relaxed);
        latch.count_down();
      });
    }

    latch.wait().unwrap();
    assert_eq!(counter.load(Ordering::Relaxed), 32);
    assert_eq!(pool.size(), 3);
  }

  #[test]
  #[should_panic]
  fn empty_pool() {
    ThreadPool::new(0);
  }
}
