use crate::config::{ForwarderConfig, ListenMode};
use crate::message::Envelope;

/// 检查消息是否符合监听条件
pub fn allowed(message: &Envelope, config: &ForwarderConfig) -> bool {
    debug!(
        target: "Filter",
        "检查消息: from_wxid={}, sender_wxid={}, room_wxid={:?}, msg_type={:?}",
        message.from_wxid,
        message.sender_wxid,
        message.room_wxid(),
        message.msg_type
    );

    match &config.listen_mode {
        ListenMode::All => true,
        ListenMode::User => {
            // 私聊时 from_wxid 即发送者；群聊时 sender_wxid 是实际发送者
            let from_hit = config.listen_user_ids.contains(&message.from_wxid);
            let sender_hit = config.listen_user_ids.contains(&message.sender_wxid);
            debug!(
                target: "Filter",
                "监听类型为 user，from 命中: {}, sender 命中: {}",
                from_hit,
                sender_hit
            );
            from_hit || sender_hit
        }
        ListenMode::Group => {
            let hit = message
                .room_wxid()
                .is_some_and(|room| config.listen_group_ids.contains(room));
            debug!(target: "Filter", "监听类型为 group，room 命中: {}", hit);
            hit
        }
        ListenMode::Unknown(mode) => {
            debug!(target: "Filter", "未知监听类型 {}，拒绝转发", mode);
            false
        }
    }
}
