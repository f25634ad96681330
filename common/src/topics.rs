pub const TOPIC_SENSOR_INSIDE_TEMP: &str = "climate/sensor/inside_temp";
pub const TOPIC_SENSOR_OUTSIDE_TEMP: &str = "climate/sensor/outside_temp";
pub const TOPIC_SENSOR_HWC_DEMAND: &str = "climate/sensor/hwc_demand";

pub const TOPIC_CONTROLLER_STATE: &str = "climate/controller/state";

pub const TOPIC_CMD_MODE: &str = "climate/cmnd/mode";
pub const TOPIC_CMD_TARGET: &str = "climate/cmnd/target";
