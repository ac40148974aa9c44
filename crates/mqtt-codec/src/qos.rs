//! MQTT delivery guarantee level.

/// `AtMostOnce` = 0, `AtLeastOnce` = 1, `ExactlyOnce` = 2. The wire value 3
/// ("Reserved") is never representable by this type — callers decode it
/// and reject it before a `QoS` value ever exists, so illegal states are
/// unrepresentable past the decode boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_bits(bits: u8) -> Option<QoS> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// A SUBACK return code: either a granted QoS or the failure sentinel
/// `0x80`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    Granted(QoS),
    Failure,
}

impl SubscribeReturnCode {
    pub const FAILURE_BYTE: u8 = 0x80;

    pub fn from_byte(byte: u8) -> Option<SubscribeReturnCode> {
        if byte == Self::FAILURE_BYTE {
            return Some(SubscribeReturnCode::Failure);
        }
        QoS::from_bits(byte).map(SubscribeReturnCode::Granted)
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SubscribeReturnCode::Granted(qos) => qos.bits(),
            SubscribeReturnCode::Failure => Self::FAILURE_BYTE,
        }
    }
}
