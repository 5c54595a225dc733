//! 单写单读三缓冲
//!
//! 三个槽位的所有权是显式的：
//! - back：写端独占（[`TripleWriter`]），在其中填充新记录
//! - middle：待取记录，只在锁内与 back/front 交换
//! - front：读端独占（[`TripleReader`]），读取期间不会被改写
//!
//! 读端永远看不到写了一半的记录；写端从不等待读端处理完成，
//! 只在交换指针的极短临界区内与读端互斥。

use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;

#[derive(Debug)]
struct Middle<T> {
    value: T,
    updated: bool,
}

/// 写端（由接收线程持有）
#[derive(Debug)]
pub struct TripleWriter<T> {
    back: T,
    middle: Arc<Mutex<Middle<T>>>,
}

/// 读端（由消费线程持有）
#[derive(Debug)]
pub struct TripleReader<T> {
    front: T,
    middle: Arc<Mutex<Middle<T>>>,
}

/// 创建一对读写端，三个槽位都初始化为 `initial`
pub fn triple_buffer<T: Clone>(initial: T) -> (TripleWriter<T>, TripleReader<T>) {
    let middle = Arc::new(Mutex::new(Middle {
        value: initial.clone(),
        updated: false,
    }));
    (
        TripleWriter {
            back: initial.clone(),
            middle: middle.clone(),
        },
        TripleReader {
            front: initial,
            middle,
        },
    )
}

impl<T> TripleWriter<T> {
    /// 正在填充的 back 槽
    pub fn back_mut(&mut self) -> &mut T {
        &mut self.back
    }

    /// 发布 back 槽：与 middle 交换并置位 `updated`
    ///
    /// 未被读取的旧 middle 记录会被覆盖（回到 back 槽）。
    pub fn swap_back(&mut self) {
        let mut middle = self.middle.lock();
        mem::swap(&mut self.back, &mut middle.value);
        middle.updated = true;
    }

    /// 写入并发布一条完整记录
    pub fn publish(&mut self, value: T) {
        self.back = value;
        self.swap_back();
    }
}

impl<T> TripleReader<T> {
    /// 若有新记录则与 middle 交换并返回 `true`；否则立即返回 `false`
    pub fn swap_front(&mut self) -> bool {
        let mut middle = self.middle.lock();
        if !middle.updated {
            return false;
        }
        mem::swap(&mut self.front, &mut middle.value);
        middle.updated = false;
        true
    }

    /// 最近一次取到的记录
    pub fn front(&self) -> &T {
        &self.front
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_swap_front_before_any_write_is_false() {
        let (_writer, mut reader) = triple_buffer(0u32);
        assert!(!reader.swap_front());
        assert_eq!(*reader.front(), 0);
    }

    #[test]
    fn test_reader_gets_latest_of_many_writes() {
        let (mut writer, mut reader) = triple_buffer(0u32);
        for i in 1..=10 {
            *writer.back_mut() = i;
            writer.swap_back();
        }
        assert!(reader.swap_front());
        assert_eq!(*reader.front(), 10);
        // 已取走，再次交换无新数据
        assert!(!reader.swap_front());
        assert_eq!(*reader.front(), 10);
    }

    #[test]
    fn test_interleaved_publish() {
        let (mut writer, mut reader) = triple_buffer(String::new());
        writer.publish("a".to_string());
        assert!(reader.swap_front());
        assert_eq!(reader.front(), "a");
        writer.publish("b".to_string());
        writer.publish("c".to_string());
        assert!(reader.swap_front());
        assert_eq!(reader.front(), "c");
    }

    #[test]
    fn test_concurrent_reader_never_sees_torn_record() {
        let (mut writer, mut reader) = triple_buffer([0u64; 32]);
        let producer = thread::spawn(move || {
            for i in 1..=20_000u64 {
                // 逐元素写入，若读端能看到 back 槽就会观察到不一致的记录
                for slot in writer.back_mut().iter_mut() {
                    *slot = i;
                }
                writer.swap_back();
            }
        });

        let mut last = 0;
        while last < 20_000 {
            if reader.swap_front() {
                let record = reader.front();
                let first = record[0];
                assert!(record.iter().all(|&v| v == first), "torn record");
                assert!(first > last, "stale record");
                last = first;
            }
        }
        producer.join().unwrap();
    }
}
