use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("colloquy.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("colloquy.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("colloquy.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("colloquy.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("colloquy.stream.errors");
pub(crate) static STREAM_DURATION: Moments = Moments::new("colloquy.stream.duration_seconds");

pub(crate) static CACHE_HITS: Counter = Counter::new("colloquy.cache.hits");
pub(crate) static CACHE_MISSES: Counter = Counter::new("colloquy.cache.misses");

pub(crate) static MEMORY_EVICTIONS: Counter = Counter::new("colloquy.memory.evictions");
pub(crate) static MEMORY_FLUSHES: Counter = Counter::new("colloquy.memory.flushes");

pub(crate) static CHAT_TURNS: Counter = Counter::new("colloquy.chat.turns");
pub(crate) static CHAT_TURN_FAILURES: Counter = Counter::new("colloquy.chat.turn_failures");
pub(crate) static CHAT_TURN_DURATION: Moments =
    Moments::new("colloquy.chat.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&CACHE_HITS);
    collector.register_counter(&CACHE_MISSES);

    collector.register_counter(&MEMORY_EVICTIONS);
    collector.register_counter(&MEMORY_FLUSHES);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_TURN_FAILURES);
    collector.register_moments(&CHAT_TURN_DURATION);
}
