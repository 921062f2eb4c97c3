mod common;

use std::collections::VecDeque;

use nrf_comm_channels::core::ring_buffer::{RingBuffer, RingBufferError};
use nrf_comm_channels::Error;
use proptest::prelude::*;

#[test]
fn test_fifo_order() {
    let mut ring: RingBuffer<u8, 4> = RingBuffer::new();
    for i in 1..=3 {
        ring.push(i).unwrap();
    }

    assert_eq!(ring.count(), 3);
    assert_eq!(ring.pop(), Ok(1));
    assert_eq!(ring.pop(), Ok(2));
    assert_eq!(ring.pop(), Ok(3));
    assert!(ring.is_empty());
}

#[test]
fn test_push_on_full_never_overwrites() {
    let mut ring: RingBuffer<u8, 3> = RingBuffer::new();
    ring.push(10).unwrap();
    ring.push(20).unwrap();
    ring.push(30).unwrap();
    assert!(ring.is_full());

    assert_eq!(ring.push(40), Err(RingBufferError::QueueFull));
    assert_eq!(ring.count(), 3);
    assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![10, 20, 30]);
}

#[test]
fn test_pop_on_empty_leaves_state() {
    let mut ring: RingBuffer<u8, 2> = RingBuffer::new();
    assert_eq!(ring.pop(), Err(RingBufferError::QueueEmpty));
    assert_eq!(ring.count(), 0);

    ring.push(1).unwrap();
    assert_eq!(ring.pop(), Ok(1));
    assert_eq!(ring.pop(), Err(RingBufferError::QueueEmpty));
    assert!(ring.is_empty());
    assert!(!ring.is_full());
}

#[test]
fn test_peek_does_not_remove() {
    let mut ring: RingBuffer<&str, 4> = RingBuffer::new();
    ring.push("a").unwrap();
    ring.push("b").unwrap();
    ring.push("c").unwrap();

    assert_eq!(ring.peek_at(0), Some(&"a"));
    assert_eq!(ring.peek_at(2), Some(&"c"));
    assert_eq!(ring.peek_at(3), None);
    assert_eq!(ring.newest(), Some(&"c"));
    assert_eq!(ring.count(), 3);
}

#[test]
fn test_wraparound_keeps_order() {
    let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
    ring.push(1).unwrap();
    ring.push(2).unwrap();
    ring.push(3).unwrap();
    ring.pop().unwrap();
    ring.pop().unwrap();
    ring.push(4).unwrap();
    ring.push(5).unwrap();

    assert!(ring.is_full());
    assert_eq!(ring.peek_at(0), Some(&3));
    assert_eq!(ring.peek_at(1), Some(&4));
    assert_eq!(ring.peek_at(2), Some(&5));
}

#[test]
fn test_discard_newest_and_clear() {
    let mut ring: RingBuffer<u8, 4> = RingBuffer::new();
    ring.push(1).unwrap();
    ring.push(2).unwrap();

    assert_eq!(ring.discard_newest(), Some(2));
    assert_eq!(ring.newest(), Some(&1));
    assert_eq!(ring.count(), 1);

    ring.push(3).unwrap();
    ring.clear();
    assert!(ring.is_empty());
    assert_eq!(ring.discard_newest(), None);
    assert_eq!(ring.capacity(), 4);
}

#[test]
fn test_error_conversion() {
    assert_eq!(Error::from(RingBufferError::QueueFull), Error::ResourceExhausted);
    assert_eq!(Error::from(RingBufferError::QueueEmpty), Error::NotFound);
}

#[test]
fn test_frame_sized_slots() {
    let mut ring: RingBuffer<heapless::Vec<u8, 256>, 2> = RingBuffer::new();
    let frame = common::create_test_data(200, 0x40);
    ring.push(frame.clone()).unwrap();

    let popped = ring.pop().unwrap();
    assert!(common::arrays_equal(&popped, &frame));
}

proptest! {
    #[test]
    fn test_count_tracks_pushes_minus_pops(ops in prop::collection::vec(any::<bool>(), 0..64)) {
        let mut ring: RingBuffer<usize, 5> = RingBuffer::new();
        let mut model = VecDeque::new();

        for (i, push) in ops.into_iter().enumerate() {
            if push {
                let result = ring.push(i);
                if model.len() == 5 {
                    prop_assert_eq!(result, Err(RingBufferError::QueueFull));
                } else {
                    prop_assert!(result.is_ok());
                    model.push_back(i);
                }
            } else {
                let expected = model.pop_front().ok_or(RingBufferError::QueueEmpty);
                prop_assert_eq!(ring.pop(), expected);
            }

            prop_assert_eq!(ring.count(), model.len());
            prop_assert_eq!(ring.is_full(), model.len() == 5);
            prop_assert_eq!(ring.is_empty(), model.is_empty());
        }

        let remaining: Vec<usize> = ring.iter().copied().collect();
        let expected: Vec<usize> = model.into_iter().collect();
        prop_assert_eq!(remaining, expected);
    }
}
