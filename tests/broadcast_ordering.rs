//! Delivery order of broadcast events.

use boot_sync::{BroadcastChannel, BroadcastEvent, BrokerConfig, Connection, MemoryBroker};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Note {
    n: u32,
}

impl BroadcastEvent for Note {
    const NAME: &'static str = "note";
}

fn wait_for_pending(channel: &BroadcastChannel<'_, Note>, count: usize) {
    let deadline = Instant::now() + WAIT;
    while channel.pending() < count && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(channel.pending(), count);
}

fn drain(channel: &BroadcastChannel<'_, Note>) -> Vec<u32> {
    std::iter::from_fn(|| channel.try_next()).map(|r| r.event.n).collect()
}

#[test]
fn test_equal_priorities_arrive_in_order() {
    let broker = MemoryBroker::new();
    let sender = Connection::establish(broker.transport(), BrokerConfig::default()).unwrap();
    let receiver = Connection::establish(broker.transport(), BrokerConfig::default()).unwrap();

    let mut inbound = BroadcastChannel::<Note>::open(&receiver, "robot").unwrap();
    let mut outbound = BroadcastChannel::<Note>::open(&sender, "console").unwrap();
    for n in 0..20 {
        outbound.send(Note { n });
    }

    wait_for_pending(&inbound, 20);
    assert_eq!(drain(&inbound), (0..20).collect::<Vec<_>>());

    outbound.close();
    inbound.close();
}

#[test]
fn test_lower_priority_overtakes() {
    let broker = MemoryBroker::new();
    let sender = Connection::establish(broker.transport(), BrokerConfig::default()).unwrap();
    let receiver = Connection::establish(broker.transport(), BrokerConfig::default()).unwrap();

    let mut inbound = BroadcastChannel::<Note>::open(&receiver, "robot").unwrap();
    let mut outbound = BroadcastChannel::<Note>::open(&sender, "console").unwrap();
    outbound.send_with_priority(Note { n: 1 }, 5);
    outbound.send_with_priority(Note { n: 2 }, 5);
    outbound.send_with_priority(Note { n: 3 }, -1);
    outbound.send(Note { n: 4 });

    wait_for_pending(&inbound, 4);
    assert_eq!(drain(&inbound), vec![3, 4, 1, 2]);

    outbound.close();
    inbound.close();
}

#[test]
fn test_wait_broadcast_times_out_when_idle() {
    let broker = MemoryBroker::new();
    let connection = Connection::establish(broker.transport(), BrokerConfig::default()).unwrap();
    let mut channel = BroadcastChannel::<Note>::open(&connection, "robot").unwrap();

    let started = Instant::now();
    assert!(channel.wait_broadcast(Duration::from_millis(30)).is_empty());
    assert!(started.elapsed() >= Duration::from_millis(30));
    channel.close();
}
