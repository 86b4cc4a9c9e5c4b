pub const TOPIC_CONTROLLER_STATE: &str = "shelly-sync/controller/state";
pub const TOPIC_CONTROLLER_SCHEDULE_STATE: &str = "shelly-sync/controller/schedule/state";

pub const TOPIC_CMD_SYNC: &str = "shelly-sync/cmnd/sync";
