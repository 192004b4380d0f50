//! ADCの自動変換シーケンス
//!
//! ## ハードウェア構成
//! - ADC1 インジェクテッド: PA0/PA1/PA2 (IN1/IN2/IN3) + 温度 PB12 (IN11)
//! - ADC2 インジェクテッド: PA6/PA7/PC4 (IN3/IN4/IN5) + 温度 PB2 (IN12)
//! - ADC1 レギュラー: バス電圧 PC1 (IN7)、ソフトウェア開始
//!
//! インジェクテッド変換は TIM1 の更新イベント（TRGO）で毎PWM周期に開始する。
//! 相電流はインライン型センサなので、スイッチング状態によらず同じ点で測れる。
//! 制御ループは JEOS フラグで変換完了を確認し、待たずに結果だけ読む。

use embassy_stm32::pac;
use embassy_stm32::pac::adc::vals::{Exten, SampleTime};
use g4_torque_driver::ports::AdcFrame;

/// JEXTSEL: ADC12 の JEXT0 = TIM1_TRGO
const JEXTSEL_TIM1_TRGO: u8 = 0;

/// バス電圧（ADC1_IN7）
const BUS_CHANNEL: u8 = 7;

/// 1チャネル分の変換シーケンス（相U, V, W, 温度の順）
pub struct PhaseSequence {
    adc: pac::adc::Adc,
    last: AdcFrame,
}

/// アナログ入力ピン（ポート, ピン, ADCチャネル）
const ADC1_PINS: [(pac::gpio::Gpio, usize, u8); 5] = [
    (pac::GPIOA, 0, 1),
    (pac::GPIOA, 1, 2),
    (pac::GPIOA, 2, 3),
    (pac::GPIOB, 12, 11),
    (pac::GPIOC, 1, BUS_CHANNEL),
];
const ADC2_PINS: [(pac::gpio::Gpio, usize, u8); 4] = [
    (pac::GPIOA, 6, 3),
    (pac::GPIOA, 7, 4),
    (pac::GPIOC, 4, 5),
    (pac::GPIOB, 2, 12),
];

fn set_analog(port: pac::gpio::Gpio, pin: usize) {
    port.moder()
        .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ANALOG));
    port.pupdr()
        .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::FLOATING));
}

fn set_sample_time(adc: pac::adc::Adc, channel: u8, sample_time: SampleTime) {
    if channel <= 9 {
        adc.smpr().modify(|w| w.set_smp(channel as usize, sample_time));
    } else {
        adc.smpr2()
            .modify(|w| w.set_smp(channel as usize - 10, sample_time));
    }
}

impl PhaseSequence {
    /// インジェクテッド4変換を設定して外部トリガー待ちにする
    ///
    /// # Safety
    /// ADCは有効化・校正済みであること。embassy の変換APIと併用しない
    unsafe fn new(adc: pac::adc::Adc, pins: &[(pac::gpio::Gpio, usize, u8)]) -> Self {
        for &(port, pin, channel) in pins {
            set_analog(port, pin);
            set_sample_time(adc, channel, SampleTime::CYCLES24_5);
        }

        adc.jsqr().write(|w| {
            w.set_jl(3); // 4変換
            w.set_jextsel(JEXTSEL_TIM1_TRGO);
            w.set_jexten(Exten::RISING_EDGE);
            for (index, &(_, _, channel)) in pins.iter().take(4).enumerate() {
                w.set_jsq(index, channel);
            }
        });
        adc.isr().write(|w| {
            w.set_jeoc(true);
            w.set_jeos(true);
        });
        adc.cr().modify(|w| w.set_jadstart(true));

        Self {
            adc,
            last: AdcFrame {
                phase_counts: [0; 3],
                temperature_counts: 0,
                complete: false,
                timestamp_us: 0,
            },
        }
    }

    /// 直近に完了したシーケンスを読む
    ///
    /// 前回読み出し以降に JEOS が立っていなければ、前回値を `complete: false` で返す
    pub fn read(&mut self, timestamp_us: u32) -> AdcFrame {
        let adc = self.adc;
        if !adc.isr().read().jeos() {
            return AdcFrame {
                complete: false,
                ..self.last
            };
        }

        let data = |rank: usize| adc.jdr(rank).read().jdata();
        self.last = AdcFrame {
            phase_counts: [data(0), data(1), data(2)],
            temperature_counts: data(3),
            complete: true,
            timestamp_us,
        };
        // 読み出し後にクリア（1を書いてクリア）
        adc.isr().write(|w| {
            w.set_jeoc(true);
            w.set_jeos(true);
        });
        self.last
    }
}

/// バス電圧のレギュラー変換
///
/// 周期の終わりに開始し、次の周期で EOC を確認して読む
pub struct BusConversion {
    adc: pac::adc::Adc,
}

impl BusConversion {
    /// # Safety
    /// ADC1 は有効化・校正済みであること
    unsafe fn new(adc: pac::adc::Adc) -> Self {
        adc.sqr1().write(|w| {
            w.set_l(0); // 1変換
            w.set_sq(0, BUS_CHANNEL);
        });
        let conversion = Self { adc };
        conversion.start();
        conversion
    }

    fn start(&self) {
        self.adc.cr().modify(|w| w.set_adstart(true));
    }

    /// 変換が完了していれば結果を返し、次の変換を開始する
    pub fn take(&mut self) -> Option<u16> {
        let isr = self.adc.isr().read();
        if !isr.eoc() {
            // 変換中でなければ（オーバーラン等）再開始
            if !self.adc.cr().read().adstart() {
                self.adc.isr().write(|w| w.set_ovr(true));
                self.start();
            }
            return None;
        }
        // DR の読み出しで EOC はクリアされる
        let counts = self.adc.dr().read().rdata();
        self.start();
        Some(counts)
    }
}

/// PWM更新イベントを TRGO に出す（インジェクテッド変換の開始点）
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
unsafe fn route_pwm_trigger() {
    pac::TIM1
        .cr2()
        .modify(|w| w.set_mms(pac::timer::vals::Mms::UPDATE));
}

/// ADC1/ADC2 の変換シーケンスを設定
///
/// # Safety
/// embassy の `Adc::new` で両ADCを有効化した後、PWM開始後に呼ぶこと
pub unsafe fn init_sequences() -> ([PhaseSequence; 2], BusConversion) {
    let rcc = pac::RCC;
    rcc.ahb2enr().modify(|w| {
        w.set_gpioaen(true);
        w.set_gpioben(true);
        w.set_gpiocen(true);
    });

    set_analog(ADC1_PINS[4].0, ADC1_PINS[4].1);
    set_sample_time(pac::ADC1, BUS_CHANNEL, SampleTime::CYCLES24_5);

    let sequences = [
        PhaseSequence::new(pac::ADC1, &ADC1_PINS[..4]),
        PhaseSequence::new(pac::ADC2, &ADC2_PINS),
    ];
    let bus = BusConversion::new(pac::ADC1);
    route_pwm_trigger();
    (sequences, bus)
}
