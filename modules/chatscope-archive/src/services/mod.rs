// Platform-specific chat sources. Each knows how to pull one transcript from
// its platform and normalize it into ordered ChatRecords.

pub mod twitch;
pub mod youtube;
