mod namespace_case;
mod reconnect_case;
