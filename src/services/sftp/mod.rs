// SFTP 文件传输服务

mod service;

pub use service::{
    transfer_once, SftpService, TransferDirection, TransferReport, TransferTracker,
};
