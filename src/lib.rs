// 签到引擎：二维码解析、扫码闸门、扫码器生命周期、签到提交与反馈展示
pub mod api;
pub mod engine;
pub mod feedback;
pub mod gate;
pub mod history;
pub mod model;
pub mod net;
pub mod pipeline;
pub mod resolver;
pub mod scan_proto;
pub mod scanner;
pub mod status;
pub mod web;
