//! ONVIF SOAP XML response templates.
//!
//! All XML lives here so the handlers stay readable. Every interpolated
//! value is escaped.

use chrono::{DateTime, Datelike, Timelike, Utc};

use quick_xml::escape::escape;

fn xml_escape(s: &str) -> String {
    escape(s).to_string()
}

/// Generic SOAP fault.
pub fn fault(code: &str, reason: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:ter="http://www.onvif.org/ver10/error">
  <s:Body>
    <s:Fault>
      <s:Code>
        <s:Value>s:Sender</s:Value>
        <s:Subcode>
          <s:Value>{}</s:Value>
        </s:Subcode>
      </s:Code>
      <s:Reason>
        <s:Text xml:lang="en">{}</s:Text>
      </s:Reason>
    </s:Fault>
  </s:Body>
</s:Envelope>"#,
        xml_escape(code),
        xml_escape(reason)
    )
}

/// Fault returned for requests that fail WS-UsernameToken validation.
pub fn not_authorized(reason: &str) -> String {
    fault("ter:NotAuthorized", reason)
}

pub fn device_information(name: &str, serial: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
  <s:Body>
    <tds:GetDeviceInformationResponse>
      <tds:Manufacturer>VirtualCam</tds:Manufacturer>
      <tds:Model>{}</tds:Model>
      <tds:FirmwareVersion>1.0.0</tds:FirmwareVersion>
      <tds:SerialNumber>{}</tds:SerialNumber>
      <tds:HardwareId>virtual-gateway</tds:HardwareId>
    </tds:GetDeviceInformationResponse>
  </s:Body>
</s:Envelope>"#,
        xml_escape(name),
        xml_escape(serial)
    )
}

pub fn capabilities(device_xaddr: &str, media_xaddr: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    <tds:GetCapabilitiesResponse>
      <tds:Capabilities>
        <tt:Device>
          <tt:XAddr>{}</tt:XAddr>
        </tt:Device>
        <tt:Media>
          <tt:XAddr>{}</tt:XAddr>
          <tt:StreamingCapabilities>
            <tt:RTPMulticast>false</tt:RTPMulticast>
            <tt:RTP_TCP>true</tt:RTP_TCP>
            <tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>
          </tt:StreamingCapabilities>
        </tt:Media>
      </tds:Capabilities>
    </tds:GetCapabilitiesResponse>
  </s:Body>
</s:Envelope>"#,
        xml_escape(device_xaddr),
        xml_escape(media_xaddr)
    )
}

pub fn services(device_xaddr: &str, media_xaddr: &str, media2_xaddr: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    <tds:GetServicesResponse>
      <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver10/device/wsdl</tds:Namespace>
        <tds:XAddr>{}</tds:XAddr>
        <tds:Version><tt:Major>2</tt:Major><tt:Minor>5</tt:Minor></tds:Version>
      </tds:Service>
      <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver10/media/wsdl</tds:Namespace>
        <tds:XAddr>{}</tds:XAddr>
        <tds:Version><tt:Major>2</tt:Major><tt:Minor>5</tt:Minor></tds:Version>
      </tds:Service>
      <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver20/media/wsdl</tds:Namespace>
        <tds:XAddr>{}</tds:XAddr>
        <tds:Version><tt:Major>2</tt:Major><tt:Minor>0</tt:Minor></tds:Version>
      </tds:Service>
    </tds:GetServicesResponse>
  </s:Body>
</s:Envelope>"#,
        xml_escape(device_xaddr),
        xml_escape(media_xaddr),
        xml_escape(media2_xaddr)
    )
}

pub fn system_date_and_time(now: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    <tds:GetSystemDateAndTimeResponse>
      <tds:SystemDateAndTime>
        <tt:DateTimeType>NTP</tt:DateTimeType>
        <tt:DaylightSavings>false</tt:DaylightSavings>
        <tt:TimeZone><tt:TZ>UTC</tt:TZ></tt:TimeZone>
        <tt:UTCDateTime>
          <tt:Time><tt:Hour>{h}</tt:Hour><tt:Minute>{min}</tt:Minute><tt:Second>{s}</tt:Second></tt:Time>
          <tt:Date><tt:Year>{y}</tt:Year><tt:Month>{mon}</tt:Month><tt:Day>{d}</tt:Day></tt:Date>
        </tt:UTCDateTime>
        <tt:LocalDateTime>
          <tt:Time><tt:Hour>{h}</tt:Hour><tt:Minute>{min}</tt:Minute><tt:Second>{s}</tt:Second></tt:Time>
          <tt:Date><tt:Year>{y}</tt:Year><tt:Month>{mon}</tt:Month><tt:Day>{d}</tt:Day></tt:Date>
        </tt:LocalDateTime>
      </tds:SystemDateAndTime>
    </tds:GetSystemDateAndTimeResponse>
  </s:Body>
</s:Envelope>"#,
        h = now.hour(),
        min = now.minute(),
        s = now.second(),
        y = now.year(),
        mon = now.month(),
        d = now.day(),
    )
}

/// Everything GetProfiles needs to know about one stream tier.
pub struct ProfileInfo<'a> {
    pub token: &'a str,
    pub name: &'a str,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate_kbps: u32,
}

fn profile_fragment(p: &ProfileInfo<'_>) -> String {
    format!(
        r#"      <trt:Profiles token="{token}" fixed="true">
        <tt:Name>{name}</tt:Name>
        <tt:VideoSourceConfiguration token="vsrc_{token}">
          <tt:Name>VideoSource</tt:Name>
          <tt:UseCount>1</tt:UseCount>
          <tt:SourceToken>video_source</tt:SourceToken>
          <tt:Bounds x="0" y="0" width="{w}" height="{h}"/>
        </tt:VideoSourceConfiguration>
        <tt:VideoEncoderConfiguration token="venc_{token}">
          <tt:Name>{name}Encoder</tt:Name>
          <tt:UseCount>1</tt:UseCount>
          <tt:Encoding>H264</tt:Encoding>
          <tt:Resolution>
            <tt:Width>{w}</tt:Width>
            <tt:Height>{h}</tt:Height>
          </tt:Resolution>
          <tt:Quality>4</tt:Quality>
          <tt:RateControl>
            <tt:FrameRateLimit>{fps}</tt:FrameRateLimit>
            <tt:EncodingInterval>1</tt:EncodingInterval>
            <tt:BitrateLimit>{kbps}</tt:BitrateLimit>
          </tt:RateControl>
          <tt:H264>
            <tt:GovLength>{fps}</tt:GovLength>
            <tt:H264Profile>Baseline</tt:H264Profile>
          </tt:H264>
        </tt:VideoEncoderConfiguration>
      </trt:Profiles>"#,
        token = xml_escape(p.token),
        name = xml_escape(p.name),
        w = p.width,
        h = p.height,
        fps = p.framerate,
        kbps = p.bitrate_kbps,
    )
}

pub fn profiles(main: &ProfileInfo<'_>, sub: &ProfileInfo<'_>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    <trt:GetProfilesResponse>
{}
{}
    </trt:GetProfilesResponse>
  </s:Body>
</s:Envelope>"#,
        profile_fragment(main),
        profile_fragment(sub)
    )
}

fn profile2_fragment(p: &ProfileInfo<'_>) -> String {
    format!(
        r#"      <tr2:Profiles token="{token}" fixed="true">
        <tr2:Name>{name}</tr2:Name>
        <tr2:Configurations>
          <tr2:VideoSource token="vsrc_{token}">
            <tt:Name>VideoSource</tt:Name>
            <tt:UseCount>1</tt:UseCount>
            <tt:SourceToken>video_source</tt:SourceToken>
            <tt:Bounds x="0" y="0" width="{w}" height="{h}"/>
          </tr2:VideoSource>
          <tr2:VideoEncoder token="venc_{token}">
            <tt:Name>{name}Encoder</tt:Name>
            <tt:UseCount>1</tt:UseCount>
            <tt:Encoding>H264</tt:Encoding>
            <tt:Resolution>
              <tt:Width>{w}</tt:Width>
              <tt:Height>{h}</tt:Height>
            </tt:Resolution>
            <tt:RateControl>
              <tt:FrameRateLimit>{fps}</tt:FrameRateLimit>
              <tt:BitrateLimit>{kbps}</tt:BitrateLimit>
            </tt:RateControl>
          </tr2:VideoEncoder>
        </tr2:Configurations>
      </tr2:Profiles>"#,
        token = xml_escape(p.token),
        name = xml_escape(p.name),
        w = p.width,
        h = p.height,
        fps = p.framerate,
        kbps = p.bitrate_kbps,
    )
}

pub fn profiles2(main: &ProfileInfo<'_>, sub: &ProfileInfo<'_>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tr2="http://www.onvif.org/ver20/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    <tr2:GetProfilesResponse>
{}
{}
    </tr2:GetProfilesResponse>
  </s:Body>
</s:Envelope>"#,
        profile2_fragment(main),
        profile2_fragment(sub)
    )
}

pub fn stream_uri(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    <trt:GetStreamUriResponse>
      <trt:MediaUri>
        <tt:Uri>{}</tt:Uri>
        <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>
        <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>
        <tt:Timeout>PT0S</tt:Timeout>
      </trt:MediaUri>
    </trt:GetStreamUriResponse>
  </s:Body>
</s:Envelope>"#,
        xml_escape(uri)
    )
}

pub fn stream_uri2(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tr2="http://www.onvif.org/ver20/media/wsdl">
  <s:Body>
    <tr2:GetStreamUriResponse>
      <tr2:Uri>{}</tr2:Uri>
    </tr2:GetStreamUriResponse>
  </s:Body>
</s:Envelope>"#,
        xml_escape(uri)
    )
}

pub fn snapshot_uri(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    <trt:GetSnapshotUriResponse>
      <trt:MediaUri>
        <tt:Uri>{}</tt:Uri>
        <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>
        <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>
        <tt:Timeout>PT0S</tt:Timeout>
      </trt:MediaUri>
    </trt:GetSnapshotUriResponse>
  </s:Body>
</s:Envelope>"#,
        xml_escape(uri)
    )
}

pub fn snapshot_uri2(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tr2="http://www.onvif.org/ver20/media/wsdl">
  <s:Body>
    <tr2:GetSnapshotUriResponse>
      <tr2:Uri>{}</tr2:Uri>
    </tr2:GetSnapshotUriResponse>
  </s:Body>
</s:Envelope>"#,
        xml_escape(uri)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_escapes_reason() {
        let xml = fault("ter:ActionNotSupported", "no <such> action");
        assert!(xml.contains("no &lt;such&gt; action"));
        assert!(xml.contains("ter:ActionNotSupported"));
    }

    #[test]
    fn test_not_authorized_subcode() {
        let xml = not_authorized("bad token");
        assert!(xml.contains("ter:NotAuthorized"));
    }

    #[test]
    fn test_profiles_carry_resolution() {
        let main = ProfileInfo {
            token: "MainProfile",
            name: "mainStream",
            width: 1920,
            height: 1080,
            framerate: 30,
            bitrate_kbps: 2500,
        };
        let sub = ProfileInfo {
            token: "SubProfile",
            name: "subStream",
            width: 640,
            height: 480,
            framerate: 15,
            bitrate_kbps: 800,
        };
        let xml = profiles(&main, &sub);
        assert!(xml.contains("<tt:Width>1920</tt:Width>"));
        assert!(xml.contains("<tt:Height>480</tt:Height>"));
        assert!(xml.contains("token=\"MainProfile\""));
        assert!(xml.contains("token=\"SubProfile\""));
        assert!(xml.contains("<tt:FrameRateLimit>15</tt:FrameRateLimit>"));
    }

    #[test]
    fn test_system_date_and_time_fields() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:34:56Z")
            .unwrap()
            .with_timezone(&Utc);
        let xml = system_date_and_time(now);
        assert!(xml.contains("<tt:Year>2026</tt:Year>"));
        assert!(xml.contains("<tt:Hour>12</tt:Hour>"));
        assert!(xml.contains("UTCDateTime"));
        assert!(xml.contains("LocalDateTime"));
    }
}
